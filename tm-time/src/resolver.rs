use crate::error::{ParseFailure, Result};
use crate::fixed::parse_fixed_format;
use crate::strategy::{ParseStrategy, ResolveContext};
use crate::zone::{parse_zone, to_local};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Last-resort interpreter consulted when nothing else understood the input,
/// e.g. asking the LLM to restate the phrase as a timestamp.
///
/// The returned text must itself be parseable as a fixed-format timestamp.
/// Implementations should give up with `None` once `cancel` fires.
#[async_trait]
pub trait FallbackInterpreter: Send + Sync {
    async fn interpret(
        &self,
        input: &str,
        reference: DateTime<Utc>,
        time_zone: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Strategy(ParseStrategy),
    FixedFormat,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub instant: DateTime<Utc>,
    pub source: ResolutionSource,
}

/// Stateless; share freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeResolver;

impl TimeResolver {
    pub fn new() -> Self {
        Self
    }

    /// Strategy chain, then fixed formats.
    pub fn resolve(
        &self,
        input: &str,
        reference: DateTime<Utc>,
        time_zone: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        self.resolve_detailed(input, reference, time_zone)
            .map(|r| r.instant)
    }

    pub fn resolve_detailed(
        &self,
        input: &str,
        reference: DateTime<Utc>,
        time_zone: Option<&str>,
    ) -> Result<Resolution> {
        match self.resolve_expression(input, reference, time_zone) {
            Err(ParseFailure::Unrecognized { input: normalized }) => {
                let zone = parse_zone(time_zone)?;
                match parse_fixed_format(input, zone) {
                    Some(instant) => {
                        tracing::debug!(input = %input, %instant, "time resolved by fixed format");
                        Ok(Resolution {
                            instant,
                            source: ResolutionSource::FixedFormat,
                        })
                    }
                    None => Err(ParseFailure::Unrecognized { input: normalized }),
                }
            }
            other => other,
        }
    }

    /// Strategy chain only. The first strategy that recognizes the input
    /// decides the outcome, including failure.
    pub fn resolve_expression(
        &self,
        input: &str,
        reference: DateTime<Utc>,
        time_zone: Option<&str>,
    ) -> Result<Resolution> {
        let normalized = normalize(input);
        if normalized.is_empty() {
            return Err(ParseFailure::Empty);
        }
        let zone = parse_zone(time_zone)?;
        let ctx = ResolveContext {
            reference,
            zone,
            local: to_local(zone, reference),
        };

        for strategy in ParseStrategy::ORDERED {
            let Some(caps) = strategy.recognize(&normalized) else {
                continue;
            };
            return match strategy.resolve(&caps, &ctx) {
                Ok(instant) => {
                    tracing::debug!(
                        input = %normalized,
                        strategy = strategy.name(),
                        %instant,
                        "time expression resolved"
                    );
                    Ok(Resolution {
                        instant,
                        source: ResolutionSource::Strategy(strategy),
                    })
                }
                Err(reason) => {
                    tracing::debug!(
                        input = %normalized,
                        strategy = strategy.name(),
                        reason = %reason,
                        "time expression matched but did not resolve"
                    );
                    Err(ParseFailure::Unresolvable {
                        strategy: strategy.name(),
                        input: normalized.clone(),
                        reason,
                    })
                }
            };
        }

        Err(ParseFailure::Unrecognized { input: normalized })
    }

    /// Full pipeline including the caller's interpreter. Only an
    /// unrecognized input reaches the interpreter, and a cancelled token
    /// ends the wait with [`ParseFailure::Cancelled`].
    pub async fn resolve_with_fallback(
        &self,
        input: &str,
        reference: DateTime<Utc>,
        time_zone: Option<&str>,
        fallback: &dyn FallbackInterpreter,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let err = match self.resolve_detailed(input, reference, time_zone) {
            Err(err @ ParseFailure::Unrecognized { .. }) => err,
            other => return other,
        };
        let zone = parse_zone(time_zone)?;
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(input = %input, "fallback interpretation cancelled");
                return Err(ParseFailure::Cancelled);
            }
            answer = fallback.interpret(input, reference, time_zone, cancel) => answer,
        };
        if cancel.is_cancelled() {
            return Err(ParseFailure::Cancelled);
        }
        let Some(candidate) = answer else {
            return Err(err);
        };
        match parse_fixed_format(&candidate, zone) {
            Some(instant) => {
                tracing::debug!(input = %input, candidate = %candidate, %instant, "time resolved by fallback");
                Ok(Resolution {
                    instant,
                    source: ResolutionSource::Fallback,
                })
            }
            None => {
                tracing::debug!(input = %input, candidate = %candidate, "fallback answer was not a timestamp");
                Err(err)
            }
        }
    }
}

fn normalize(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, TimeZone, Weekday};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .expect("valid utc")
    }

    fn resolve(input: &str, reference: DateTime<Utc>) -> DateTime<Utc> {
        TimeResolver::new()
            .resolve(input, reference, None)
            .unwrap_or_else(|e| panic!("{input}: {e}"))
    }

    #[test]
    fn in_ten_minutes_from_new_year() {
        let reference = utc(2025, 1, 1, 0, 0, 0);
        assert_eq!(resolve("in 10 minutes", reference), utc(2025, 1, 1, 0, 10, 0));
    }

    #[test]
    fn in_n_units_adds_exactly() {
        let reference = utc(2025, 3, 14, 9, 26, 53);
        for n in [1_i64, 2, 7, 45] {
            assert_eq!(
                resolve(&format!("in {n} minutes"), reference),
                reference + Duration::minutes(n)
            );
            assert_eq!(
                resolve(&format!("in {n} hours"), reference),
                reference + Duration::hours(n)
            );
            assert_eq!(
                resolve(&format!("in {n} days"), reference),
                reference + Duration::days(n)
            );
            assert_eq!(
                resolve(&format!("in {n} weeks"), reference),
                reference + Duration::weeks(n)
            );
        }
    }

    #[test]
    fn article_and_half_hour_durations() {
        let reference = utc(2025, 1, 1, 8, 0, 0);
        assert_eq!(resolve("in an hour", reference), utc(2025, 1, 1, 9, 0, 0));
        assert_eq!(resolve("in half an hour", reference), utc(2025, 1, 1, 8, 30, 0));
        assert_eq!(resolve("45 min", reference), utc(2025, 1, 1, 8, 45, 0));
    }

    #[test]
    fn midnight_is_start_of_next_day() {
        let reference = utc(2025, 6, 10, 15, 45, 0);
        assert_eq!(resolve("midnight", reference), utc(2025, 6, 11, 0, 0, 0));
        assert_eq!(resolve("at midnight", reference), utc(2025, 6, 11, 0, 0, 0));
        assert_eq!(resolve("noon", reference), utc(2025, 6, 10, 12, 0, 0));
    }

    #[test]
    fn clock_time_on_reference_date() {
        let reference = utc(2025, 6, 10, 15, 45, 0);
        assert_eq!(resolve("at 3pm", reference), utc(2025, 6, 10, 15, 0, 0));
        assert_eq!(resolve("at 15:00", reference), utc(2025, 6, 10, 15, 0, 0));
        assert_eq!(resolve("AT  9:15 AM", reference), utc(2025, 6, 10, 9, 15, 0));
    }

    #[test]
    fn next_same_weekday_is_a_week_out() {
        // 2025-01-06 is a Monday.
        let reference = utc(2025, 1, 6, 10, 0, 0);
        assert_eq!(reference.weekday(), Weekday::Mon);
        assert_eq!(resolve("next monday", reference), reference + Duration::days(7));
        assert_eq!(resolve("on monday", reference), reference + Duration::days(7));
        assert_eq!(resolve("next wednesday", reference), reference + Duration::days(2));
        assert_eq!(
            resolve("on friday at 3pm", reference),
            utc(2025, 1, 10, 15, 0, 0)
        );
    }

    #[test]
    fn next_week_is_seven_days() {
        let reference = utc(2025, 1, 8, 13, 14, 15);
        assert_eq!(resolve("next week", reference), reference + Duration::days(7));
    }

    #[test]
    fn end_of_week_on_friday_rolls_forward() {
        // 2025-01-10 is a Friday.
        let reference = utc(2025, 1, 10, 9, 0, 0);
        assert_eq!(resolve("end of week", reference), utc(2025, 1, 17, 17, 0, 0));
        let wednesday = utc(2025, 1, 8, 9, 0, 0);
        assert_eq!(resolve("end of the week", wednesday), utc(2025, 1, 10, 17, 0, 0));
    }

    #[test]
    fn end_of_day_is_five_pm() {
        let reference = utc(2025, 1, 8, 9, 0, 0);
        assert_eq!(resolve("eod", reference), utc(2025, 1, 8, 17, 0, 0));
        assert_eq!(resolve("end of day", reference), utc(2025, 1, 8, 17, 0, 0));
    }

    #[test]
    fn parts_of_day() {
        let reference = utc(2025, 1, 8, 7, 0, 0);
        assert_eq!(resolve("tonight", reference), utc(2025, 1, 8, 20, 0, 0));
        assert_eq!(resolve("this morning", reference), utc(2025, 1, 8, 9, 0, 0));
        assert_eq!(resolve("this afternoon", reference), utc(2025, 1, 8, 14, 0, 0));
        assert_eq!(resolve("this evening", reference), utc(2025, 1, 8, 18, 0, 0));
    }

    #[test]
    fn tomorrow_variants() {
        let reference = utc(2025, 1, 31, 7, 30, 0);
        assert_eq!(resolve("tomorrow", reference), utc(2025, 2, 1, 7, 30, 0));
        assert_eq!(resolve("tomorrow at 4pm", reference), utc(2025, 2, 1, 16, 0, 0));
        assert_eq!(resolve("tomorrow 08:15", reference), utc(2025, 2, 1, 8, 15, 0));
        assert_eq!(resolve("tomorrow morning", reference), utc(2025, 2, 1, 9, 0, 0));
        assert_eq!(resolve("tomorrow evening", reference), utc(2025, 2, 1, 18, 0, 0));
    }

    #[test]
    fn time_zone_shifts_wall_clock() {
        // 23:00 UTC on the 1st is already the 2nd in Tokyo (UTC+9).
        let reference = utc(2025, 1, 1, 23, 0, 0);
        let out = TimeResolver::new()
            .resolve("at 9am", reference, Some("Asia/Tokyo"))
            .expect("tokyo clock");
        assert_eq!(out, utc(2025, 1, 2, 0, 0, 0));
        let out = TimeResolver::new()
            .resolve("in 10 minutes", reference, Some("Asia/Tokyo"))
            .expect("tokyo duration");
        assert_eq!(out, utc(2025, 1, 1, 23, 10, 0));
    }

    #[test]
    fn matched_but_unresolvable_does_not_fall_through() {
        let reference = utc(2025, 1, 1, 0, 0, 0);
        let err = TimeResolver::new()
            .resolve("at 25:00", reference, None)
            .expect_err("hour out of range");
        assert!(matches!(
            err,
            ParseFailure::Unresolvable {
                strategy: "clock_time",
                ..
            }
        ));
    }

    #[test]
    fn overflowing_duration_is_unresolvable() {
        let reference = utc(2025, 1, 1, 0, 0, 0);
        let err = TimeResolver::new()
            .resolve("in 99999999999999999999 weeks", reference, None)
            .expect_err("overflow");
        assert!(matches!(err, ParseFailure::Unresolvable { strategy: "duration", .. }));
    }

    #[test]
    fn zero_duration_falls_through_to_unrecognized() {
        let reference = utc(2025, 1, 1, 0, 0, 0);
        let err = TimeResolver::new()
            .resolve("in 0 minutes", reference, None)
            .expect_err("zero is no match");
        assert_eq!(
            err,
            ParseFailure::Unrecognized {
                input: "in 0 minutes".to_string()
            }
        );
    }

    #[test]
    fn fixed_formats_after_strategies() {
        let reference = utc(2025, 1, 1, 0, 0, 0);
        let r = TimeResolver::new()
            .resolve_detailed("2025-02-03 10:00", reference, Some("UTC"))
            .expect("fixed format");
        assert_eq!(r.instant, utc(2025, 2, 3, 10, 0, 0));
        assert_eq!(r.source, ResolutionSource::FixedFormat);
    }

    #[test]
    fn empty_and_unknown_zone() {
        let reference = utc(2025, 1, 1, 0, 0, 0);
        let resolver = TimeResolver::new();
        assert_eq!(resolver.resolve("   ", reference, None), Err(ParseFailure::Empty));
        assert!(matches!(
            resolver.resolve("tonight", reference, Some("Nowhere/Land")),
            Err(ParseFailure::UnknownTimeZone { .. })
        ));
    }

    struct Canned(Option<&'static str>);

    #[async_trait]
    impl FallbackInterpreter for Canned {
        async fn interpret(
            &self,
            _input: &str,
            _reference: DateTime<Utc>,
            _time_zone: Option<&str>,
            _cancel: &CancellationToken,
        ) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct NeverAnswers;

    #[async_trait]
    impl FallbackInterpreter for NeverAnswers {
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

    #[tokio::test]
    async fn fallback_only_for_unrecognized_input() {
        let reference = utc(2025, 1, 1, 0, 0, 0);
        let resolver = TimeResolver::new();
        let cancel = CancellationToken::new();

        let r = resolver
            .resolve_with_fallback(
                "after lunch on the first monday",
                reference,
                None,
                &Canned(Some("2025-01-06T13:00:00Z")),
                &cancel,
            )
            .await
            .expect("fallback answer");
        assert_eq!(r.source, ResolutionSource::Fallback);
        assert_eq!(r.instant, utc(2025, 1, 6, 13, 0, 0));

        let err = resolver
            .resolve_with_fallback(
                "at 25:00",
                reference,
                None,
                &Canned(Some("2025-01-06T13:00:00Z")),
                &cancel,
            )
            .await
            .expect_err("unresolvable is not retried");
        assert!(matches!(err, ParseFailure::Unresolvable { .. }));

        let err = resolver
            .resolve_with_fallback("sometime", reference, None, &Canned(Some("no idea")), &cancel)
            .await
            .expect_err("non-timestamp fallback");
        assert!(matches!(err, ParseFailure::Unrecognized { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_waiting_on_the_interpreter() {
        let reference = utc(2025, 1, 1, 0, 0, 0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            TimeResolver::new().resolve_with_fallback(
                "after the meeting",
                reference,
                None,
                &NeverAnswers,
                &cancel,
            ),
        )
        .await
        .expect("returns without the interpreter answering")
        .expect_err("cancelled");
        assert_eq!(err, ParseFailure::Cancelled);

        // Recognized input never consults the interpreter.
        let r = TimeResolver::new()
            .resolve_with_fallback("in 5 minutes", reference, None, &NeverAnswers, &cancel)
            .await
            .expect("strategy answer");
        assert_eq!(r.instant, utc(2025, 1, 1, 0, 5, 0));
    }
}
