use super::common::{reverse_complement_bases, validate_bases};
use super::error::{Error, Result};
use log::warn;
use memchr::memmem::Finder;
use owo_colors::OwoColorize;
use std::borrow::Cow;
use std::fmt;

pub const MAX_SLOTS: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Blue,
    Green,
    Yellow,
}

impl Color {
    /// Registration order of the color groups.
    pub const ALL: [Color; 4] = [Color::Red, Color::Blue, Color::Green, Color::Yellow];

    pub fn name(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Blue => "blue",
            Color::Green => "green",
            Color::Yellow => "yellow",
        }
    }

    pub fn initial(&self) -> char {
        match self {
            Color::Red => 'r',
            Color::Blue => 'b',
            Color::Green => 'g',
            Color::Yellow => 'y',
        }
    }

    pub fn from_initial(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|x| x.initial() == c)
    }

    pub fn paint(&self, text: &str) -> String {
        match self {
            Color::Red => text.bright_red().to_string(),
            Color::Blue => text.bright_blue().to_string(),
            Color::Green => text.bright_green().to_string(),
            Color::Yellow => text.bright_yellow().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchTerm {
    text: String,
    color: Color,
    slot: u8,
    fwd: Finder<'static>,
    rc: Option<(String, Finder<'static>)>,
}

impl SearchTerm {
    pub fn new<T: AsRef<str>>(text: T, color: Color, slot: u8, reverse_complement: bool) -> Result<Self> {
        let text = text.as_ref().trim();
        let invalid = |reason: String| Error::InvalidTerm {
            term: text.to_owned(),
            reason,
        };
        if text.is_empty() {
            return Err(invalid("empty search term".to_owned()));
        }
        if !(1..=MAX_SLOTS).contains(&slot) {
            return Err(invalid(format!("slot {slot} is out of range 1..={MAX_SLOTS}")));
        }
        validate_bases(text).map_err(|e| invalid(format!("{e}, only A, C, G, T and N are supported")))?;
        let rc_text = if reverse_complement {
            Some(reverse_complement_bases(text).map_err(|e| invalid(e.to_string()))?)
        } else {
            None
        };
        Ok(Self::build(text.to_owned(), color, slot, rc_text))
    }

    fn build(text: String, color: Color, slot: u8, rc_text: Option<String>) -> Self {
        let fwd = Finder::new(text.as_bytes()).into_owned();
        let rc = rc_text.map(|t| {
            let finder = Finder::new(t.as_bytes()).into_owned();
            (t, finder)
        });
        Self {
            text,
            color,
            slot,
            fwd,
            rc,
        }
    }

    fn to_uppercase(&self) -> Self {
        Self::build(
            self.text.to_ascii_uppercase(),
            self.color,
            self.slot,
            self.rc.as_ref().map(|(t, _)| t.to_ascii_uppercase()),
        )
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn reverse_complement(&self) -> bool {
        self.rc.is_some()
    }

    pub fn rc_text(&self) -> Option<&str> {
        self.rc.as_ref().map(|(t, _)| t.as_str())
    }

    /// Short flag name, e.g. `r1`.
    pub fn label(&self) -> String {
        format!("{}{}", self.color.initial(), self.slot)
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)?;
        if let Some(rc) = self.rc_text() {
            write!(f, " (rc {rc})")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MatchResult {
    pub hits: Vec<bool>,
    /// Set when the reverse complement check was skipped for this sequence.
    pub invalid_base: Option<Error>,
}

impl MatchResult {
    pub fn all_matched(&self) -> bool {
        self.hits.iter().all(|&x| x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub color: Color,
    pub term: usize,
}

#[derive(Debug, Clone)]
pub struct PatternMatcher {
    terms: Vec<SearchTerm>,
    ignore_case: bool,
}

impl PatternMatcher {
    pub fn new(terms: Vec<SearchTerm>, ignore_case: bool) -> Self {
        let terms = if ignore_case {
            terms.iter().map(|x| x.to_uppercase()).collect()
        } else {
            terms
        };
        Self { terms, ignore_case }
    }

    pub fn terms(&self) -> &[SearchTerm] {
        &self.terms
    }

    fn prepare<'a>(&self, seq: &'a str) -> Cow<'a, str> {
        if self.ignore_case {
            Cow::Owned(seq.to_ascii_uppercase())
        } else {
            Cow::Borrowed(seq)
        }
    }

    // `seq` must already be case folded
    fn term_hit(&self, seq: &str, term: &SearchTerm) -> Result<bool> {
        if term.fwd.find(seq.as_bytes()).is_some() {
            return Ok(true);
        }
        match &term.rc {
            Some((_, rc)) => {
                validate_bases(seq)?;
                Ok(rc.find(seq.as_bytes()).is_some())
            }
            None => Ok(false),
        }
    }

    /// Whether `term` occurs in `seq`, or in its reverse complement when the term asks for it.
    pub fn matches(&self, seq: &str, term: &SearchTerm) -> bool {
        let seq = self.prepare(seq);
        let term = if self.ignore_case {
            Cow::Owned(term.to_uppercase())
        } else {
            Cow::Borrowed(term)
        };
        match self.term_hit(&seq, &term) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("skip reverse complement search of {}: {}", term.text, e);
                false
            }
        }
    }

    pub fn evaluate(&self, seq: &str) -> MatchResult {
        let seq = self.prepare(seq);
        let bytes = seq.as_bytes();
        let mut bases: Option<Result<()>> = None;
        let hits = self
            .terms
            .iter()
            .map(|term| {
                if term.fwd.find(bytes).is_some() {
                    return true;
                }
                match &term.rc {
                    Some((_, rc)) => {
                        bases.get_or_insert_with(|| validate_bases(&seq)).is_ok()
                            && rc.find(bytes).is_some()
                    }
                    None => false,
                }
            })
            .collect();
        MatchResult {
            hits,
            invalid_base: bases.and_then(|x| x.err()),
        }
    }

    /// True iff every configured term matches `seq`.
    pub fn sequence_all_match(&self, seq: &str) -> bool {
        self.evaluate(seq).all_matched()
    }

    /// Every non-overlapping occurrence of every term, in term order, unsorted.
    pub fn spans(&self, seq: &str) -> Vec<Span> {
        let seq = self.prepare(seq);
        let bytes = seq.as_bytes();
        let rc_ok = validate_bases(&seq).is_ok();
        let mut spans = Vec::new();
        for (i, term) in self.terms.iter().enumerate() {
            let mut push = |start: usize, len: usize| {
                spans.push(Span {
                    start,
                    end: start + len,
                    color: term.color,
                    term: i,
                })
            };
            term.fwd.find_iter(bytes).for_each(|p| push(p, term.text.len()));
            if let Some((t, rc)) = &term.rc {
                if rc_ok {
                    rc.find_iter(bytes).for_each(|p| push(p, t.len()));
                }
            }
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::common::reverse_complement_bases;
    use proptest::prelude::*;

    fn term(text: &str, color: Color, slot: u8, rc: bool) -> SearchTerm {
        SearchTerm::new(text, color, slot, rc).unwrap()
    }

    #[test]
    fn test_direct_match() {
        let t = term("ACGT", Color::Red, 1, false);
        let m = PatternMatcher::new(vec![t.clone()], false);
        assert!(m.matches("ACGTACGTACGT", &t));
        assert!(m.sequence_all_match("ACGTACGTACGT"));
        assert!(!m.sequence_all_match("AAAAAAAA"));
    }

    #[test]
    fn test_either_orientation() {
        // rc of TACG is CGTA; the direct orientation is enough
        let t = term("TACG", Color::Red, 1, true);
        assert_eq!(t.rc_text(), Some("CGTA"));
        let m = PatternMatcher::new(vec![t.clone()], false);
        assert!(m.matches("ACGTACGTACGT", &t));

        let t = term("GGGA", Color::Blue, 2, true);
        let m = PatternMatcher::new(vec![t.clone()], false);
        assert!(m.matches("AATCCCAA", &t));
        let t = term("GGGA", Color::Blue, 2, false);
        assert!(!m.matches("AATCCCAA", &t));
    }

    #[test]
    fn test_filler_round_trip() {
        let t = term("GATTACA", Color::Green, 1, false);
        let m = PatternMatcher::new(vec![t], false);
        let filler = "CCCCCCCCCC";
        assert!(m.sequence_all_match(&format!("{filler}GATTACA{filler}")));
        assert!(!m.sequence_all_match(&format!("{filler}{filler}")));
    }

    #[test]
    fn test_all_terms_required() {
        let m = PatternMatcher::new(
            vec![
                term("AAA", Color::Red, 1, false),
                term("CCC", Color::Yellow, 1, false),
            ],
            false,
        );
        let r = m.evaluate("AAATTT");
        assert_eq!(r.hits, vec![true, false]);
        assert!(!r.all_matched());
        assert!(m.sequence_all_match("AAATTTCCC"));
    }

    #[test]
    fn test_invalid_base_is_non_match() {
        let t = term("TTT", Color::Red, 1, true);
        let m = PatternMatcher::new(vec![t.clone()], false);
        // AAA would match the rc orientation, but the read holds an unknown symbol
        let r = m.evaluate("AAAX");
        assert_eq!(r.hits, vec![false]);
        assert!(matches!(r.invalid_base, Some(Error::InvalidBase { base: 'X', pos: 3 })));
        assert!(!m.matches("AAAX", &t));
        // direct hits do not need the check
        let r = m.evaluate("TTTX");
        assert!(r.all_matched());
        assert!(r.invalid_base.is_none());
    }

    #[test]
    fn test_ignore_case() {
        let t = term("ACGT", Color::Red, 1, false);
        let m = PatternMatcher::new(vec![t.clone()], true);
        assert!(m.matches("ttacgttt", &t));
        assert!(m.sequence_all_match("ttacgttt"));
        assert!(m.sequence_all_match("ttAcGttt"));
        let m = PatternMatcher::new(vec![term("acgt", Color::Red, 1, false)], true);
        assert!(m.sequence_all_match("TTACGTTT"));

        let m = PatternMatcher::new(vec![t], false);
        assert!(!m.sequence_all_match("ttacgttt"));
        assert!(m.sequence_all_match("TTACGTTT"));
    }

    #[test]
    fn test_ignore_case_reverse_complement() {
        // soft-masked read holding the rc of GGGA
        let m = PatternMatcher::new(vec![term("GGGA", Color::Blue, 1, true)], true);
        let r = m.evaluate("aatcccaa");
        assert!(r.all_matched());
        assert!(r.invalid_base.is_none());
    }

    #[test]
    fn test_invalid_terms() {
        assert!(SearchTerm::new("  ", Color::Red, 1, false).is_err());
        assert!(SearchTerm::new("ACGT", Color::Red, 0, false).is_err());
        assert!(SearchTerm::new("ACGT", Color::Red, 10, false).is_err());
        assert!(SearchTerm::new("ACRT", Color::Red, 1, true).is_err());
        assert!(SearchTerm::new("ACRT", Color::Red, 1, false).is_err());
        assert!(SearchTerm::new("ACé", Color::Red, 1, true).is_err());
        assert!(SearchTerm::new("ACé", Color::Red, 1, false).is_err());
        match SearchTerm::new("AC GT", Color::Blue, 2, false) {
            Err(Error::InvalidTerm { term, reason }) => {
                assert_eq!(term, "AC GT");
                assert!(reason.contains("only A, C, G, T and N"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(SearchTerm::new("acgtn", Color::Red, 1, true).is_ok());
        assert_eq!(term("ACGT", Color::Yellow, 7, false).label(), "y7");
    }

    #[test]
    fn test_spans() {
        let m = PatternMatcher::new(
            vec![
                term("AC", Color::Red, 1, false),
                term("GG", Color::Blue, 1, true),
            ],
            false,
        );
        let spans = m.spans("ACCCAC");
        let starts: Vec<(usize, usize, usize)> = spans.iter().map(|s| (s.start, s.end, s.term)).collect();
        // CC is the reverse complement of GG
        assert_eq!(starts, vec![(0, 2, 0), (4, 6, 0), (1, 3, 1)]);
    }

    proptest! {
        #[test]
        fn prop_all_match_is_conjunction(
            seq in "[ACGT]{0,80}",
            texts in proptest::collection::vec("[ACGT]{1,4}", 1..5),
            rc in any::<bool>(),
        ) {
            let terms: Vec<SearchTerm> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| SearchTerm::new(t, Color::ALL[i % 4], 1, rc).unwrap())
                .collect();
            let m = PatternMatcher::new(terms.clone(), false);
            let rc_seq = reverse_complement_bases(&seq).unwrap();
            let expected = texts.iter().all(|t| seq.contains(t.as_str()) || (rc && rc_seq.contains(t.as_str())));
            prop_assert_eq!(m.sequence_all_match(&seq), expected);
            prop_assert_eq!(
                m.sequence_all_match(&seq),
                terms.iter().all(|t| m.matches(&seq, t))
            );
        }
    }
}
