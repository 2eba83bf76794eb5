use super::*;
use crate::config::MemoryConfig;
use crate::gateway::GatewayError;
use crate::tokens::TokenCounter;

fn memory(max_context_tokens: usize) -> ConversationMemory {
    ConversationMemory::new(
        MemoryConfig { max_context_tokens },
        TokenCounter::heuristic(),
    )
}

async fn canned_summary(_transcript: String) -> Result<String, GatewayError> {
    Ok("summary of earlier turns".to_string())
}

async fn failing_summary(_transcript: String) -> Result<String, GatewayError> {
    Err(GatewayError::UpstreamUnavailable {
        message: "down".to_string(),
    })
}

#[tokio::test]
async fn short_history_is_kept_verbatim() {
    let mut memory = memory(500);

    memory.append(Role::User, "how do I export?", canned_summary).await;
    memory
        .append(Role::Assistant, "use the export menu", canned_summary)
        .await;

    let context = memory.context();
    assert_eq!(context.len(), 2);
    assert_eq!(context[0].content, "how do I export?");
    assert!(matches!(context[1].role, Role::Assistant));
}

#[tokio::test]
async fn invariant_holds_after_every_append() {
    let mut memory = memory(120);

    for i in 0..30 {
        memory
            .append(
                if i % 2 == 0 { Role::User } else { Role::Assistant },
                format!("turn {i}: some moderately sized message content here"),
                canned_summary,
            )
            .await;
        assert!(
            memory.total_tokens() <= memory.max_context_tokens(),
            "budget exceeded after append {i}: {} > {}",
            memory.total_tokens(),
            memory.max_context_tokens()
        );
    }
}

#[tokio::test]
async fn overflow_folds_oldest_turns_into_summary() {
    let mut memory = memory(100);

    for i in 0..12 {
        memory
            .append(Role::User, format!("question number {i} with extra words"), canned_summary)
            .await;
    }

    let context = memory.context();
    assert!(matches!(context[0].role, Role::Summary));
    assert_eq!(context[0].content, "summary of earlier turns");
    // The newest message always survives verbatim.
    assert!(context.last().unwrap().content.contains("question number 11"));
}

#[tokio::test]
async fn summarizer_failure_still_restores_invariant() {
    let mut memory = memory(100);

    for i in 0..12 {
        memory
            .append(Role::User, format!("question number {i} with extra words"), failing_summary)
            .await;
        assert!(memory.total_tokens() <= memory.max_context_tokens());
    }

    // No summary was produced, but the window was still shed.
    assert!(memory.context().iter().all(|m| !matches!(m.role, Role::Summary)));
}

#[tokio::test]
async fn pathological_single_turn_is_head_truncated_with_marker() {
    let mut memory = memory(60);

    let huge = "lorem ipsum dolor sit amet ".repeat(100);
    let effect = memory.append(Role::User, huge, canned_summary).await;

    assert!(effect.truncated);
    assert!(memory.total_tokens() <= memory.max_context_tokens());

    let context = memory.context();
    let survivor = context
        .iter()
        .find(|m| matches!(m.role, Role::User))
        .expect("truncated turn still present");
    assert!(survivor.content.starts_with(TRUNCATION_MARKER));
}

#[tokio::test]
async fn reset_clears_messages_and_summary() {
    let mut memory = memory(100);

    for i in 0..12 {
        memory
            .append(Role::User, format!("question {i} padded with words"), canned_summary)
            .await;
    }
    memory.reset();

    assert!(memory.context().is_empty());
    assert_eq!(memory.total_tokens(), 0);
}

#[tokio::test]
async fn context_preserves_chronological_order() {
    let mut memory = memory(10_000);

    memory.append(Role::User, "first", canned_summary).await;
    memory.append(Role::Assistant, "second", canned_summary).await;
    memory.append(Role::User, "third", canned_summary).await;

    let contents: Vec<&str> = memory.context().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn registry_binds_one_memory_per_conversation() {
    let registry = MemoryRegistry::new(
        MemoryConfig {
            max_context_tokens: 100,
        },
        TokenCounter::heuristic(),
    );

    let a1 = registry.bind("conv-a");
    let a2 = registry.bind("conv-a");
    let b = registry.bind("conv-b");

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    assert_eq!(registry.len(), 2);

    registry.remove("conv-a");
    assert_eq!(registry.len(), 1);
}
