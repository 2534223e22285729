use super::matcher::{PatternMatcher, Span};

/// Drops overlaps: the earlier start owns the shared bases, ties go to the longer span and
/// then to the earlier term. A later span reaching past the owner keeps its tail.
pub fn resolve(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.end.cmp(&a.end))
            .then(a.term.cmp(&b.term))
    });
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    let mut cursor = 0;
    for mut span in spans {
        if span.end <= cursor {
            continue;
        }
        span.start = span.start.max(cursor);
        cursor = span.end;
        out.push(span);
    }
    out
}

pub fn render(seq: &str, matcher: &PatternMatcher, color: bool) -> String {
    if !color {
        return seq.to_owned();
    }
    let spans = resolve(matcher.spans(seq));
    let mut out = String::with_capacity(seq.len() + spans.len() * 10);
    let mut last = 0;
    for span in spans {
        out.push_str(&seq[last..span.start]);
        out.push_str(&span.color.paint(&seq[span.start..span.end]));
        last = span.end;
    }
    out.push_str(&seq[last..]);
    out
}
