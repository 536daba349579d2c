//! Chat stream framing properties.
//!
//! The frame parser must decode the same event sequence no matter how the
//! transport slices the bytes: one delivery, byte-at-a-time, or any split
//! points in between.

use souschef_bridge::client::FrameParser;
use souschef_bridge::handlers::chat::StreamEvent;

/// A representative wire capture: content fragments, a recipe update, done.
fn wire_bytes() -> Vec<u8> {
    let recipe = r#"{"id":"r1","title":"Spicy Pasta","servings":2,"ingredients":[{"text":"pasta"},{"text":"chili"}],"steps":[{"title":"Step 1","description":"boil"},{"title":"Step 2","description":"toss"}],"lastUpdated":1712000000000}"#;
    format!(
        "data: {{\"type\":\"content\",\"content\":\"Let's \"}}\n\n\
         data: {{\"type\":\"content\",\"content\":\"spice it up.\"}}\n\n\
         data: {{\"type\":\"recipeUpdate\",\"recipe\":{recipe}}}\n\n\
         data: {{\"type\":\"done\"}}\n\n"
    )
    .into_bytes()
}

fn decode_whole(bytes: &[u8]) -> Vec<StreamEvent> {
    FrameParser::new().push(bytes)
}

#[test]
fn one_shot_decoding_yields_expected_sequence() {
    let events = decode_whole(&wire_bytes());
    assert_eq!(events.len(), 4);
    assert_eq!(
        events[0],
        StreamEvent::Content {
            content: "Let's ".to_string()
        }
    );
    match &events[2] {
        StreamEvent::RecipeUpdate { recipe } => {
            assert_eq!(recipe.title, "Spicy Pasta");
            assert_eq!(recipe.ingredients.len(), 2);
        }
        other => panic!("Expected recipeUpdate, got {other:?}"),
    }
    assert_eq!(events[3], StreamEvent::Done);
}

#[test]
fn any_two_way_split_decodes_identically() {
    let wire = wire_bytes();
    let expected = decode_whole(&wire);

    for split in 0..=wire.len() {
        let mut parser = FrameParser::new();
        let mut events = parser.push(&wire[..split]);
        events.extend(parser.push(&wire[split..]));
        assert_eq!(events, expected, "split at byte {split}");
        assert_eq!(parser.pending_bytes(), 0, "split at byte {split}");
    }
}

#[test]
fn three_way_splits_decode_identically() {
    let wire = wire_bytes();
    let expected = decode_whole(&wire);

    // Every (i, j) pair is quadratic in the capture length; stride keeps the
    // test fast while still crossing every frame boundary.
    for i in (0..=wire.len()).step_by(7) {
        for j in (i..=wire.len()).step_by(11) {
            let mut parser = FrameParser::new();
            let mut events = parser.push(&wire[..i]);
            events.extend(parser.push(&wire[i..j]));
            events.extend(parser.push(&wire[j..]));
            assert_eq!(events, expected, "splits at bytes {i} and {j}");
        }
    }
}

#[test]
fn byte_at_a_time_decodes_identically() {
    let wire = wire_bytes();
    let expected = decode_whole(&wire);

    let mut parser = FrameParser::new();
    let mut events = Vec::new();
    for byte in &wire {
        events.extend(parser.push(std::slice::from_ref(byte)));
    }
    assert_eq!(events, expected);
}

#[test]
fn malformed_frame_is_skipped_at_any_split() {
    let wire = b"data: {broken\n\ndata: {\"type\":\"done\"}\n\n".to_vec();
    let expected = vec![StreamEvent::Done];

    for split in 0..=wire.len() {
        let mut parser = FrameParser::new();
        let mut events = parser.push(&wire[..split]);
        events.extend(parser.push(&wire[split..]));
        assert_eq!(events, expected, "split at byte {split}");
    }
}
