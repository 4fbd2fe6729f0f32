//! Property tests: canonical types survive serde roundtrips and the
//! conversation balance check matches its definition.

use proptest::prelude::*;
use quill_types::{
    ContentPart, Message, Role, StopReason, StreamEvent, TokenUsage, ToolResultContent,
    pending_tool_uses, verify_tool_balance,
};

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::System),
        Just(Role::User),
        Just(Role::Assistant),
    ]
}

fn arb_stop_reason() -> impl Strategy<Value = StopReason> {
    prop_oneof![
        Just(StopReason::EndTurn),
        Just(StopReason::MaxTokens),
        Just(StopReason::StopSequence),
        Just(StopReason::ToolUse),
        Just(StopReason::ContentFilter),
        Just(StopReason::Error),
    ]
}

fn arb_text_part() -> impl Strategy<Value = ContentPart> {
    "[a-zA-Z0-9 .,!?]{0,64}".prop_map(|text| ContentPart::Text { text })
}

proptest! {
    #[test]
    fn role_roundtrips(role in arb_role()) {
        let json = serde_json::to_string(&role).unwrap();
        let back: Role = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(role, back);
    }

    #[test]
    fn stop_reason_roundtrips(reason in arb_stop_reason()) {
        let json = serde_json::to_string(&reason).unwrap();
        let back: StopReason = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(reason, back);
    }

    #[test]
    fn text_messages_roundtrip(role in arb_role(), parts in prop::collection::vec(arb_text_part(), 0..4)) {
        let msg = Message::new(role, parts);
        let json = serde_json::to_value(&msg).unwrap();
        let back: Message = serde_json::from_value(json).unwrap();
        prop_assert_eq!(msg, back);
    }

    #[test]
    fn stream_text_events_roundtrip(text in "[a-zA-Z0-9 ]{0,32}") {
        let event = StreamEvent::Text { text };
        let json = serde_json::to_value(&event).unwrap();
        let back: StreamEvent = serde_json::from_value(json).unwrap();
        prop_assert_eq!(event, back);
    }

    #[test]
    fn usage_roundtrips(input in 0u64..1_000_000, output in 0u64..1_000_000) {
        let usage = TokenUsage { input_tokens: input, output_tokens: output, ..Default::default() };
        let json = serde_json::to_string(&usage).unwrap();
        let back: TokenUsage = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(usage, back);
    }

    /// Answering every pending tool use always rebalances a conversation.
    #[test]
    fn answering_pending_uses_balances(ids in prop::collection::hash_set("[a-z]{1,8}", 1..6)) {
        let uses: Vec<ContentPart> = ids
            .iter()
            .map(|id| ContentPart::ToolUse {
                id: id.clone(),
                name: "shell".into(),
                input: serde_json::json!({}),
            })
            .collect();
        let mut messages = vec![Message::new(Role::Assistant, uses)];
        prop_assert!(verify_tool_balance(&messages).is_err());

        let results: Vec<ContentPart> = pending_tool_uses(&messages)
            .into_iter()
            .map(|(id, _)| ContentPart::ToolResult {
                tool_use_id: id,
                content: ToolResultContent::Text("ok".into()),
                is_error: false,
            })
            .collect();
        messages.push(Message::new(Role::User, results));
        prop_assert!(verify_tool_balance(&messages).is_ok());
        prop_assert!(pending_tool_uses(&messages).is_empty());
    }
}
