pub const DIAGRAM_CODE_START: &str = "[[DIAGRAM_CODE_START]]";
pub const DIAGRAM_CODE_END: &str = "[[DIAGRAM_CODE_END]]";

/// Start/end sentinels delimiting executable code in a model response.
#[derive(Debug, Clone, Copy)]
pub struct Markers<'a> {
    pub start: &'a str,
    pub end: &'a str,
}

impl Markers<'static> {
    pub const DIAGRAM: Markers<'static> = Markers {
        start: DIAGRAM_CODE_START,
        end: DIAGRAM_CODE_END,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Prose(String),
    CodeBlock(String),
}

fn push_prose(segments: &mut Vec<Segment>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        segments.push(Segment::Prose(text.to_string()));
    }
}

/// Split a response into prose and code segments, in document order.
///
/// Each start marker pairs with the nearest following end marker. A start
/// marker with no end marker degrades leniently: everything from that
/// marker on is kept as one prose segment, marker included, so nothing the
/// model wrote is lost. Stray end markers stay in the prose verbatim.
/// Whitespace-only prose is dropped; code blocks are kept even when empty.
pub fn split_segments(text: &str, markers: Markers<'_>) -> Vec<Segment> {
    let mut segments = Vec::new();
    if markers.start.is_empty() || markers.end.is_empty() {
        push_prose(&mut segments, text);
        return segments;
    }

    let mut rest = text;
    loop {
        let Some(start) = rest.find(markers.start) else {
            push_prose(&mut segments, rest);
            break;
        };
        let body = &rest[start + markers.start.len()..];
        let Some(end) = body.find(markers.end) else {
            tracing::warn!(
                offset = text.len() - rest.len() + start,
                "Unterminated diagram code marker, keeping remainder as prose"
            );
            push_prose(&mut segments, &rest[..start]);
            push_prose(&mut segments, &rest[start..]);
            break;
        };

        push_prose(&mut segments, &rest[..start]);
        segments.push(Segment::CodeBlock(body[..end].trim().to_string()));
        rest = &body[end + markers.end.len()..];
    }

    segments
}
