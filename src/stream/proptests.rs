//! Property-based tests for stream framing

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

/// A line as the backend might send it, newline included
fn arb_line() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-zA-Z0-9 {}:\",\u{e9}\u{4e2d}\u{1f600}]{1,40}".prop_map(|p| format!("{DATA_PREFIX}{p}\n")),
        1 => "[a-zA-Z0-9 {}:\",\u{e9}\u{4e2d}\u{1f600}]{1,40}".prop_map(|p| format!("{DATA_PREFIX}{p}\r\n")),
        1 => Just("\n".to_string()),
        1 => Just(": keepalive\n".to_string()),
        1 => "[a-z_]{1,12}".prop_map(|kind| format!("event: {kind}\n")),
    ]
}

fn arb_body() -> impl Strategy<Value = Vec<u8>> {
    (
        proptest::collection::vec(arb_line(), 0..12),
        proptest::option::of("[a-z{}\":]{1,20}"),
    )
        .prop_map(|(lines, tail)| {
            let mut body = lines.concat();
            // Last line may lack its terminator
            if let Some(tail) = tail {
                body.push_str(DATA_PREFIX);
                body.push_str(&tail);
            }
            body.into_bytes()
        })
}

/// Split `body` at the given (unsorted, possibly duplicate) cut points
fn chunk(body: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (body.len() + 1)).collect();
    cuts.sort_unstable();
    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(body[start..cut].to_vec());
        start = cut;
    }
    chunks.push(body[start..].to_vec());
    chunks
}

fn collect(chunks: &[Vec<u8>]) -> Vec<Frame> {
    let mut buffer = FrameBuffer::new();
    let mut frames: Vec<Frame> = chunks.iter().flat_map(|c| buffer.push(c)).collect();
    frames.extend(buffer.finish());
    frames
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_frames_independent_of_chunking(
        body in arb_body(),
        cuts in proptest::collection::vec(any::<usize>(), 0..16)
    ) {
        let whole = collect(&[body.clone()]);
        let pieces = collect(&chunk(&body, &cuts));
        prop_assert_eq!(whole, pieces);
    }

    #[test]
    fn prop_frames_never_carry_prefix_or_line_ending(body in arb_body()) {
        for frame in collect(&[body]) {
            prop_assert!(!frame.payload.contains('\n'));
            prop_assert!(!frame.payload.ends_with('\r'));
            prop_assert!(!frame.payload.trim().is_empty());
        }
    }

    #[test]
    fn prop_push_keeps_only_unterminated_tail(body in arb_body()) {
        let mut buffer = FrameBuffer::new();
        buffer.push(&body);
        let tail = body.iter().rev().take_while(|&&b| b != b'\n').count();
        prop_assert_eq!(buffer.pending_len(), tail);
    }
}
