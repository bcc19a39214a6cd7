//! Execution traces for debugging a single recommendation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::llm::HistoryEntry;
use crate::location::UserLocation;

/// Which recommender produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Pipeline,
    #[value(alias = "react")]
    Agent,
}

impl Mode {
    #[must_use]
    pub fn trace_label(self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Agent => "react",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceMeta {
    pub query: String,
    pub agent: &'static str,
    /// Historic date when replaying fixtures
    pub date: Option<NaiveDate>,
    pub location: UserLocation,
    pub model: String,
    pub timestamp: String,
}

impl TraceMeta {
    #[must_use]
    pub fn new(
        query: &str,
        mode: Mode,
        date: Option<NaiveDate>,
        location: &UserLocation,
        model: &str,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            query: query.to_string(),
            agent: mode.trace_label(),
            date,
            location: location.clone(),
            model: model.to_string(),
            timestamp: now.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct Trace<'a> {
    meta: &'a TraceMeta,
    result: &'a Value,
    lm_history: &'a [HistoryEntry],
}

/// `{agent}_{date|live}_{YYYYmmdd_HHMMSS}.json`
#[must_use]
pub fn trace_file_name(meta: &TraceMeta, now: DateTime<Local>) -> String {
    let date = meta
        .date
        .map_or_else(|| "live".to_string(), |d| d.to_string());
    format!("{}_{}_{}.json", meta.agent, date, now.format("%Y%m%d_%H%M%S"))
}

/// Write the trace and return its path
pub fn save_trace(
    dir: &Path,
    meta: &TraceMeta,
    result: &Value,
    history: &[HistoryEntry],
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(trace_file_name(meta, Local::now()));
    let trace = Trace {
        meta,
        result,
        lm_history: history,
    };
    fs::write(&path, serde_json::to_string_pretty(&trace)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), calls = history.len(), "Trace saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 29, 7, 5, 9).unwrap()
    }

    #[test]
    fn test_file_name_for_replay_and_live() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 29);
        let replay = TraceMeta::new("Epic pass powder?", Mode::Pipeline, date, &UserLocation::boston(), "m", now());
        assert_eq!(
            trace_file_name(&replay, now()),
            "pipeline_2025-03-29_20250329_070509.json"
        );

        let live = TraceMeta::new("q", Mode::Agent, None, &UserLocation::boston(), "m", now());
        assert_eq!(trace_file_name(&live, now()), "react_live_20250329_070509.json");
    }

    /// Records one history entry per call
    struct Recording(std::sync::Mutex<Vec<HistoryEntry>>);

    #[async_trait::async_trait]
    impl crate::llm::LanguageModel for Recording {
        fn name(&self) -> &str {
            "test/recording"
        }

        async fn complete(&self, prompt: &crate::llm::Prompt) -> Result<String, crate::llm::LlmError> {
            self.0.lock().unwrap().push(HistoryEntry {
                timestamp: String::new(),
                model: "recording".to_string(),
                system: prompt.system.clone(),
                user: prompt.user.clone(),
                response: "{}".to_string(),
                input_tokens: 1,
                output_tokens: 1,
            });
            Ok("{}".to_string())
        }

        fn history(&self) -> Vec<HistoryEntry> {
            self.0.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_trace_holds_only_its_own_query_calls() {
        use crate::llm::{LanguageModel, Prompt};

        let model = Recording(std::sync::Mutex::new(Vec::new()));
        let dir = tempfile::tempdir().unwrap();
        let mut saved = Vec::new();

        for (i, query) in ["Powder on Ikon?", "Night skiing near Boston?"].into_iter().enumerate() {
            let first_call = model.history().len();
            for _ in 0..=i {
                model.complete(&Prompt::new("Task: ParseSkiQuery", query)).await.unwrap();
            }
            let meta = TraceMeta::new(query, Mode::Agent, None, &UserLocation::boston(), model.name(), now());
            let path = save_trace(
                &dir.path().join(i.to_string()),
                &meta,
                &Value::Null,
                &model.history_since(first_call),
            )
            .unwrap();
            saved.push(serde_json::from_str::<Value>(&fs::read_to_string(path).unwrap()).unwrap());
        }

        assert_eq!(saved[0]["lm_history"].as_array().unwrap().len(), 1);
        let second = saved[1]["lm_history"].as_array().unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|call| call["user"] == "Night skiing near Boston?"));
    }

    #[test]
    fn test_save_trace_layout() {
        let dir = tempfile::tempdir().unwrap();
        let meta = TraceMeta::new(
            "Best powder?",
            Mode::Agent,
            None,
            &UserLocation::boston(),
            "anthropic/claude-haiku-4-5-20251001",
            now(),
        );
        let history = vec![HistoryEntry {
            timestamp: "2025-03-29T07:05:09".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            system: "Task: SkiAgentStep".to_string(),
            user: "[[ ## query ## ]]".to_string(),
            response: "{}".to_string(),
            input_tokens: 10,
            output_tokens: 2,
        }];
        let result = serde_json::json!({"agent": "react", "recommendation": "Stowe"});

        let path = save_trace(&dir.path().join("traces"), &meta, &result, &history).unwrap();
        let saved: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(saved["meta"]["agent"], "react");
        assert_eq!(saved["meta"]["location"]["name"], "Boston, MA");
        assert!(saved["meta"]["date"].is_null());
        assert_eq!(saved["result"]["recommendation"], "Stowe");
        assert_eq!(saved["lm_history"][0]["input_tokens"], 10);
    }
}
