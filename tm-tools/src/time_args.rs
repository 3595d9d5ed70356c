use crate::error::{Result, ToolError};
use crate::plugin::InvocationContext;
use crate::store::PersonStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tm_time::{FallbackInterpreter, ParseFailure, TimeResolver};

/// Turns time arguments ("in 10 minutes", "friday at 3pm") into instants
/// for the plugins, in the person's zone.
#[derive(Clone)]
pub struct TimeArguments {
    resolver: TimeResolver,
    people: Arc<dyn PersonStore>,
    fallback: Option<Arc<dyn FallbackInterpreter>>,
}

impl TimeArguments {
    pub fn new(people: Arc<dyn PersonStore>) -> Self {
        Self {
            resolver: TimeResolver::new(),
            people,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackInterpreter>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Stored person zone, else the zone the caller supplied.
    pub async fn zone_for(&self, ctx: &InvocationContext) -> Result<Option<String>> {
        let stored = self
            .people
            .get(&ctx.owner)
            .await?
            .and_then(|p| p.timezone);
        Ok(stored.or_else(|| ctx.timezone.clone()))
    }

    pub async fn resolve(&self, expression: &str, ctx: &InvocationContext) -> Result<DateTime<Utc>> {
        let zone = self.zone_for(ctx).await?;
        let resolved = match &self.fallback {
            Some(fallback) => self
                .resolver
                .resolve_with_fallback(
                    expression,
                    ctx.now,
                    zone.as_deref(),
                    fallback.as_ref(),
                    &ctx.cancel,
                )
                .await
                .map(|r| r.instant),
            None => self.resolver.resolve(expression, ctx.now, zone.as_deref()),
        };
        resolved.map_err(|failure| {
            if failure == ParseFailure::Cancelled {
                return ToolError::Cancelled;
            }
            tracing::debug!(expression = %expression, error = %failure, "time argument rejected");
            ToolError::InvalidArguments(describe_failure(expression, &failure))
        })
    }
}

fn describe_failure(expression: &str, failure: &ParseFailure) -> String {
    match failure {
        ParseFailure::UnknownTimeZone { zone } => format!(
            "I couldn't use the time zone {zone:?}; ask the user for a valid IANA zone such as Europe/Paris"
        ),
        _ => format!("I couldn't understand the time {expression:?} ({failure})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryPersonStore, Person};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio_util::sync::CancellationToken;

    struct Silent;

    #[async_trait]
    impl FallbackInterpreter for Silent {
        async fn interpret(
            &self,
            _input: &str,
            _reference: DateTime<Utc>,
            _time_zone: Option<&str>,
            _cancel: &CancellationToken,
        ) -> Option<String> {
            std::future::pending().await
        }
    }

    fn ctx_at(now: DateTime<Utc>, timezone: Option<&str>) -> InvocationContext {
        let mut ctx = InvocationContext::new("ana", timezone.map(str::to_string));
        ctx.now = now;
        ctx
    }

    #[tokio::test]
    async fn stored_zone_beats_caller_zone() {
        let people = Arc::new(InMemoryPersonStore::new());
        people
            .upsert(Person {
                id: "ana".to_string(),
                timezone: Some("Asia/Tokyo".to_string()),
            })
            .await
            .expect("upsert");
        let args = TimeArguments::new(people);
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("now");

        let ctx = ctx_at(now, Some("Europe/London"));
        assert_eq!(args.zone_for(&ctx).await.expect("zone").as_deref(), Some("Asia/Tokyo"));
        // 09:00 in Tokyo is midnight UTC.
        let at = args.resolve("at 9am", &ctx).await.expect("resolve");
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("utc"));
    }

    #[tokio::test]
    async fn unparseable_time_is_an_argument_error() {
        let args = TimeArguments::new(Arc::new(InMemoryPersonStore::new()));
        let err = args
            .resolve("when pigs fly", &ctx_at(Utc::now(), None))
            .await
            .expect_err("nonsense");
        assert!(matches!(err, ToolError::InvalidArguments(msg) if msg.contains("couldn't understand")));
    }

    #[tokio::test]
    async fn cancelled_fallback_cancels_the_call() {
        let args = TimeArguments::new(Arc::new(InMemoryPersonStore::new()))
            .with_fallback(Arc::new(Silent));
        let ctx = ctx_at(Utc::now(), None);
        ctx.cancel.cancel();
        let err = args
            .resolve("once the kettle boils", &ctx)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ToolError::Cancelled));
    }
}
