//! Turning a user instruction into an ordered [`Plan`].

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::{complete_with_timeout, LanguageModel, Prompt};
use crate::workflow::{ContentSource, Plan, PlanStep, StepAction};

static WEATHER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:weather|forecast|temperature)\b").unwrap());

// "store" and "record" only count with an object; alone they are usually
// nouns or adjectives ("record temperature").
static SAVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:save|write|persist|(?:store|record)\s+(?:it|this|that|them|the\s+(?:result|results|report|weather|forecast)))\b",
    )
    .unwrap()
});

static PREPOSITION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:in|for|at)\s+").unwrap());

/// Words that end a location name, or show that a preposition introduces
/// something other than a place ("for tomorrow", "in a file").
const NOT_LOCATION: &[&str] = &[
    "a", "an", "and", "at", "currently", "file", "for", "in", "into", "it", "later", "next",
    "now", "on", "please", "right", "save", "the", "then", "this", "to", "today", "tomorrow",
    "tonight", "week", "weekend", "write",
];

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["“]([^"”]+)["”]|(?:^|\s)'([^']+)'"#).unwrap());

/// Produces the ordered steps for one instruction.
#[async_trait::async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, instruction: &str) -> Result<Plan>;
}

/// Fixed routing rules: weather questions go to research, save requests go
/// to the executor, fed by the research result when there is one.
#[derive(Debug, Default, Clone)]
pub struct RulePlanner;

#[async_trait::async_trait]
impl Planner for RulePlanner {
    async fn plan(&self, instruction: &str) -> Result<Plan> {
        let wants_weather = WEATHER.find(instruction);
        let save_at = SAVE.find(instruction);
        let mut plan = Plan::new(instruction);

        match wants_weather {
            Some(m) => {
                let location = extract_location(&instruction[m.end()..])
                    .or_else(|| extract_location(instruction))
                    .ok_or_else(|| {
                        Error::PlanningAmbiguous(
                            "the request asks about weather but names no location".into(),
                        )
                    })?;
                let lookup = plan.add_step(PlanStep::lookup_weather(&location));

                if let Some(save) = save_at {
                    let path = extract_filename(&instruction[save.end()..])
                        .unwrap_or_else(|| default_filename(&location));
                    plan.add_step(PlanStep::write_file(
                        path,
                        ContentSource::FromStep { step: lookup },
                    ));
                }
            }
            None => {
                let save = save_at.ok_or_else(|| {
                    Error::PlanningAmbiguous(
                        "no agent handles this request; I can look up current weather and save results to files".into(),
                    )
                })?;
                let (text, quoted) = extract_quoted(instruction).ok_or_else(|| {
                    Error::PlanningAmbiguous("the request asks to save something but gives no content".into())
                })?;
                // The target is named outside the quoted content, usually after it
                let path = extract_filename(&instruction[quoted.end..])
                    .or_else(|| {
                        instruction
                            .get(save.end()..quoted.start)
                            .and_then(extract_filename)
                    })
                    .ok_or_else(|| Error::PlanningAmbiguous("the request does not name a file to save to".into()))?;
                plan.add_step(PlanStep::write_file(path, ContentSource::Literal { text }));
            }
        }

        plan.validate()?;
        debug!(steps = plan.steps.len(), "Planned request with routing rules");
        Ok(plan)
    }
}

/// Location named after "in", "for" or "at".
///
/// Each preposition is tried in turn; the first one followed by a place name
/// wins, so "for tomorrow in London" yields "London".
pub fn extract_location(text: &str) -> Option<String> {
    PREPOSITION
        .find_iter(text)
        .find_map(|m| location_words(&text[m.end()..]))
}

fn location_words(text: &str) -> Option<String> {
    let mut words = Vec::new();
    for token in text.split_whitespace() {
        let word = token.trim_end_matches(|c: char| "?,!;:.".contains(c));
        let is_word = word.chars().next().is_some_and(char::is_alphabetic)
            && word.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-');
        if !is_word || NOT_LOCATION.iter().any(|w| w.eq_ignore_ascii_case(word)) {
            break;
        }
        words.push(word);
        if word.len() != token.len() {
            break;
        }
    }
    (!words.is_empty()).then(|| words.join(" "))
}

/// First token that looks like a file name (`stem.ext`).
pub fn extract_filename(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| {
            token
                .trim_matches(|c: char| "\"'`“”‘’()[]{}<>,;:!?".contains(c))
                .trim_end_matches('.')
        })
        .find(|token| looks_like_filename(token))
        .map(str::to_string)
}

fn looks_like_filename(token: &str) -> bool {
    if !token
        .chars()
        .all(|c| c.is_alphanumeric() || "._-/".contains(c))
    {
        return false;
    }
    match token.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && !stem.ends_with('/')
                && (2..=8).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Quoted text and the byte range of the whole quotation.
fn extract_quoted(text: &str) -> Option<(String, Range<usize>)> {
    let c = QUOTED.captures(text)?;
    let inner = c.get(1).or_else(|| c.get(2))?;
    Some((inner.as_str().to_string(), c.get(0)?.range()))
}

/// `weather_<slug>.txt` for a location.
pub fn default_filename(location: &str) -> String {
    let mut slug = String::new();
    for c in location.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    format!("weather_{}.txt", if slug.is_empty() { "report" } else { slug })
}

const PLANNER_INSTRUCTIONS: &str = r#"You are the Coordinator Agent. You do not answer questions yourself; you delegate.
Available agents:
- research: looks up the current weather for one location.
- execute: writes text to a file.
Reply with JSON only, no prose:
{"steps": [
  {"action": "lookup_weather", "location": "<city>"},
  {"action": "write_file", "path": "<file name>", "content_from_step": 1}
]}
Use "content" instead of "content_from_step" when the user supplies the text to save.
Steps are numbered from 1. Include only the steps the request needs.
If no agent can help, reply {"steps": [], "reason": "<why>"}."#;

/// Asks the language model for the plan and checks it before use.
pub struct ModelPlanner {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    steps: Vec<RawStep>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawStep {
    LookupWeather {
        location: String,
    },
    WriteFile {
        path: Option<String>,
        content: Option<String>,
        content_from_step: Option<usize>,
    },
}

impl ModelPlanner {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    fn build(instruction: &str, raw: RawPlan) -> Result<Plan> {
        if raw.steps.is_empty() {
            return Err(Error::PlanningAmbiguous(
                raw.reason
                    .unwrap_or_else(|| "the model found no agent for this request".into()),
            ));
        }

        let mut plan = Plan::new(instruction);
        for raw_step in raw.steps {
            let step = match raw_step {
                RawStep::LookupWeather { location } if !location.trim().is_empty() => {
                    PlanStep::lookup_weather(location.trim())
                }
                RawStep::LookupWeather { .. } => {
                    return Err(Error::PlanningAmbiguous("weather step has no location".into()))
                }
                RawStep::WriteFile {
                    path,
                    content,
                    content_from_step,
                } => {
                    let source = match (content, content_from_step) {
                        (_, Some(n)) if n >= 1 => ContentSource::FromStep { step: n - 1 },
                        (Some(text), None) => ContentSource::Literal { text },
                        _ => {
                            return Err(Error::PlanningAmbiguous(
                                "write step has no content".into(),
                            ))
                        }
                    };
                    let path = path
                        .filter(|p| !p.trim().is_empty())
                        .or_else(|| default_path_for(&plan, &source))
                        .ok_or_else(|| Error::PlanningAmbiguous("write step has no path".into()))?;
                    PlanStep::write_file(path, source)
                }
            };
            plan.add_step(step);
        }

        plan.validate()?;
        Ok(plan)
    }
}

fn default_path_for(plan: &Plan, source: &ContentSource) -> Option<String> {
    let ContentSource::FromStep { step } = source else {
        return None;
    };
    match &plan.steps.get(*step)?.action {
        StepAction::LookupWeather { location } => Some(default_filename(location)),
        _ => None,
    }
}

/// Strip a Markdown code fence, if the model wrapped its JSON in one.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait::async_trait]
impl Planner for ModelPlanner {
    async fn plan(&self, instruction: &str) -> Result<Plan> {
        let prompt = Prompt::new(PLANNER_INSTRUCTIONS, instruction);
        let reply = complete_with_timeout(self.model.as_ref(), &prompt, self.timeout).await?;

        let raw: RawPlan = serde_json::from_str(strip_fence(&reply)).map_err(|e| {
            Error::PlanningAmbiguous(format!("the model's plan is not valid JSON: {}", e))
        })?;
        let plan = Self::build(instruction, raw)?;
        debug!(steps = plan.steps.len(), "Planned request with model");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::task::Capability;

    async fn rules(instruction: &str) -> Result<Plan> {
        RulePlanner.plan(instruction).await
    }

    #[tokio::test]
    async fn test_weather_and_save() {
        let plan = rules("What's the weather in Seattle and save it to a file?")
            .await
            .unwrap();
        assert_eq!(
            plan.steps[0].action,
            StepAction::LookupWeather { location: "Seattle".into() }
        );
        assert_eq!(
            plan.steps[1].action,
            StepAction::WriteFile {
                path: "weather_seattle.txt".into(),
                content: ContentSource::FromStep { step: 0 },
            }
        );
    }

    #[tokio::test]
    async fn test_weather_only_plans_one_agent() {
        let plan = rules("What is the weather in New York today?").await.unwrap();
        assert_eq!(plan.capabilities(), vec![Capability::Research]);
        assert_eq!(
            plan.steps[0].action,
            StepAction::LookupWeather { location: "New York".into() }
        );
    }

    #[tokio::test]
    async fn test_named_file() {
        let plan = rules("Get the forecast for Paris, then write it to reports/paris.md.")
            .await
            .unwrap();
        assert_eq!(
            plan.steps[1].action,
            StepAction::WriteFile {
                path: "reports/paris.md".into(),
                content: ContentSource::FromStep { step: 0 },
            }
        );
    }

    #[tokio::test]
    async fn test_save_only_plans_executor() {
        let plan = rules(r#"Save "buy milk" to notes.txt"#).await.unwrap();
        assert_eq!(plan.capabilities(), vec![Capability::Execute]);
        assert_eq!(
            plan.steps[0].action,
            StepAction::WriteFile {
                path: "notes.txt".into(),
                content: ContentSource::Literal { text: "buy milk".into() },
            }
        );
    }

    #[tokio::test]
    async fn test_time_phrases_are_not_part_of_the_location() {
        let cases = [
            ("What's the weather in Seattle right now?", "Seattle"),
            ("What's the weather like in Tokyo this week?", "Tokyo"),
            ("What's the forecast for tomorrow in London?", "London"),
            ("Weather at San Francisco tonight please", "San Francisco"),
            ("How's the weather in Paris later today?", "Paris"),
            ("Temperature in New York next weekend", "New York"),
        ];
        for (instruction, location) in cases {
            let plan = rules(instruction).await.unwrap();
            assert_eq!(
                plan.steps[0].action,
                StepAction::LookupWeather { location: location.into() },
                "{instruction}"
            );
        }
    }

    #[tokio::test]
    async fn test_nouns_do_not_trigger_a_save() {
        for instruction in [
            "What's the record temperature in Seattle?",
            "What's the weather in Berlin? It's for a store opening.",
        ] {
            let plan = rules(instruction).await.unwrap();
            assert_eq!(plan.capabilities(), vec![Capability::Research], "{instruction}");
        }

        let plan = rules("Check the weather in Sydney and store it in sydney.txt")
            .await
            .unwrap();
        assert_eq!(
            plan.steps[1].action,
            StepAction::WriteFile {
                path: "sydney.txt".into(),
                content: ContentSource::FromStep { step: 0 },
            }
        );
    }

    #[tokio::test]
    async fn test_filename_inside_quotes_is_content() {
        let plan = rules(r#"Save "see notes.txt" to out.txt"#).await.unwrap();
        assert_eq!(
            plan.steps[0].action,
            StepAction::WriteFile {
                path: "out.txt".into(),
                content: ContentSource::Literal { text: "see notes.txt".into() },
            }
        );

        let plan = rules(r#"Write to todo.md "call notes.txt owner""#).await.unwrap();
        assert_eq!(
            plan.steps[0].action,
            StepAction::WriteFile {
                path: "todo.md".into(),
                content: ContentSource::Literal { text: "call notes.txt owner".into() },
            }
        );
    }

    #[test]
    fn test_extract_location() {
        assert_eq!(extract_location("in Seattle and save it"), Some("Seattle".into()));
        assert_eq!(extract_location("for Paris, then write it"), Some("Paris".into()));
        assert_eq!(extract_location("for tomorrow"), None);
        assert_eq!(extract_location("in a file"), None);
    }

    #[tokio::test]
    async fn test_ambiguous_requests() {
        for instruction in [
            "Tell me a joke",
            "What's the weather like?",
            "Save it somewhere",
            r#"Save "buy milk" somewhere"#,
        ] {
            let err = rules(instruction).await.unwrap_err();
            assert!(matches!(err, Error::PlanningAmbiguous(_)), "{instruction}");
        }
    }

    #[test]
    fn test_default_filename() {
        assert_eq!(default_filename("San Francisco"), "weather_san_francisco.txt");
        assert_eq!(default_filename("  "), "weather_report.txt");
    }

    #[test]
    fn test_extract_filename_ignores_abbreviations() {
        assert_eq!(extract_filename("it e.g. somewhere"), None);
        assert_eq!(extract_filename("to `out.json`, please"), Some("out.json".into()));
        assert_eq!(extract_filename("to a file"), None);
    }

    #[tokio::test]
    async fn test_model_plan_with_fence() {
        let reply = "```json\n{\"steps\": [{\"action\": \"lookup_weather\", \"location\": \"Tokyo\"}, {\"action\": \"write_file\", \"content_from_step\": 1}]}\n```";
        let model = Arc::new(ScriptedModel::new(vec![Ok(reply.into())]));
        let planner = ModelPlanner::new(model, Duration::from_secs(5));

        let plan = planner.plan("Tokyo weather to a file").await.unwrap();
        assert_eq!(
            plan.steps[1].action,
            StepAction::WriteFile {
                path: "weather_tokyo.txt".into(),
                content: ContentSource::FromStep { step: 0 },
            }
        );
    }

    #[tokio::test]
    async fn test_model_plan_rejections() {
        let replies = [
            r#"{"steps": [], "reason": "I only do weather"}"#,
            "Sure! Here's the plan.",
            r#"{"steps": [{"action": "write_file", "path": "a.txt", "content_from_step": 2}, {"action": "lookup_weather", "location": "Oslo"}]}"#,
            r#"{"steps": [{"action": "send_email"}]}"#,
        ];
        for reply in replies {
            let model = Arc::new(ScriptedModel::new(vec![Ok(reply.into())]));
            let planner = ModelPlanner::new(model, Duration::from_secs(5));
            let err = planner.plan("x").await.unwrap_err();
            assert!(matches!(err, Error::PlanningAmbiguous(_)), "{reply}");
        }
    }
}
