//! Asks the LLM to restate a time phrase nothing else understood.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tm_llm::{ChatMessage, CompletionRequest, LlmProvider};
use tm_time::FallbackInterpreter;
use tokio_util::sync::CancellationToken;

const INTERPRETER_PROMPT: &str = "You convert informal time expressions into timestamps. \
Reply with a single RFC 3339 timestamp including its UTC offset and nothing else. \
If the expression does not describe a point in time, reply with NONE.";

pub struct LlmTimeInterpreter {
    llm: Arc<dyn LlmProvider>,
}

impl LlmTimeInterpreter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FallbackInterpreter for LlmTimeInterpreter {
    #[tracing::instrument(level = "debug", skip_all, fields(input = %input))]
    async fn interpret(
        &self,
        input: &str,
        reference: DateTime<Utc>,
        time_zone: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let question = format!(
            "Now: {}\nTime zone: {}\nExpression: {input}",
            reference.to_rfc3339_opts(SecondsFormat::Secs, true),
            time_zone.unwrap_or("UTC"),
        );
        let history = [ChatMessage::user(question)];
        let request = CompletionRequest {
            system_prompt: INTERPRETER_PROMPT,
            history: &history,
            functions: &[],
            temperature: 0.0,
            allow_tool_calls: false,
        };
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("llm time interpretation cancelled");
                return None;
            }
            response = self.llm.complete(request) => response,
        };
        match response {
            Ok(response) => {
                let answer = response.message.content.trim().to_string();
                if answer.is_empty() || answer.eq_ignore_ascii_case("none") {
                    tracing::debug!("llm could not interpret time expression");
                    None
                } else {
                    Some(answer)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "llm time interpretation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::tests::ScriptedLlm;
    use chrono::TimeZone;
    use std::time::Duration;
    use tm_llm::ChatResponse;
    use tm_time::{ParseFailure, ResolutionSource, TimeResolver};

    struct HungLlm;

    #[async_trait]
    impl LlmProvider for HungLlm {
        async fn complete(&self, _request: CompletionRequest<'_>) -> tm_llm::Result<ChatResponse> {
            std::future::pending().await
        }

        fn model(&self) -> &str {
            "hung"
        }
    }

    #[tokio::test]
    async fn llm_answer_feeds_the_fixed_format_parser() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text("2025-03-03T08:00:00+01:00")]));
        let interpreter = LlmTimeInterpreter::new(llm.clone());
        let reference = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().expect("reference");

        let resolution = TimeResolver::new()
            .resolve_with_fallback(
                "first thing monday",
                reference,
                Some("Europe/Paris"),
                &interpreter,
                &CancellationToken::new(),
            )
            .await
            .expect("fallback resolution");
        assert_eq!(resolution.source, ResolutionSource::Fallback);
        assert_eq!(
            resolution.instant,
            Utc.with_ymd_and_hms(2025, 3, 3, 7, 0, 0).single().expect("expected")
        );
        assert!(!llm.saw_tools_allowed());
    }

    #[tokio::test]
    async fn none_means_no_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text("NONE")]));
        let interpreter = LlmTimeInterpreter::new(llm);
        let out = interpreter
            .interpret("whenever", Utc::now(), None, &CancellationToken::new())
            .await;
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn cancelled_turn_does_not_wait_for_a_hung_provider() {
        let interpreter = LlmTimeInterpreter::new(Arc::new(HungLlm));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = tokio::time::timeout(
            Duration::from_secs(5),
            interpreter.interpret("after the standup", Utc::now(), None, &cancel),
        )
        .await
        .expect("interpret returns once cancelled");
        assert_eq!(out, None);

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            TimeResolver::new().resolve_with_fallback(
                "after the standup",
                Utc::now(),
                None,
                &interpreter,
                &cancel,
            ),
        )
        .await
        .expect("resolution returns once cancelled")
        .expect_err("cancelled");
        assert_eq!(err, ParseFailure::Cancelled);
    }
}
