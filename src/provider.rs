use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ai::AIProvider;
use crate::filters::SearchFilters;
use crate::models::Job;

const MAX_TOKENS: u32 = 16384;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("search task failed: {0}")]
    Internal(String),
}

/// Anything that can turn a filter set into a list of postings.
pub trait JobSource: Send + Sync {
    fn fetch_jobs(&self, filters: &SearchFilters) -> Result<Vec<Job>, FetchError>;
    fn name(&self) -> &str;
}

/// Runs a blocking source off the async executor and bounds it by `timeout`.
pub async fn fetch_with_timeout(
    source: Arc<dyn JobSource>,
    filters: SearchFilters,
    timeout: Duration,
) -> Result<Vec<Job>, FetchError> {
    let task = tokio::task::spawn_blocking(move || source.fetch_jobs(&filters));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(FetchError::Internal(join_err.to_string())),
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

// --- Generative source ---

pub struct AiJobSource {
    provider: Box<dyn AIProvider>,
    label: String,
}

impl AiJobSource {
    pub fn new(provider: Box<dyn AIProvider>) -> Self {
        let label = format!("ai:{}", provider.model_name());
        Self { provider, label }
    }
}

impl JobSource for AiJobSource {
    fn fetch_jobs(&self, filters: &SearchFilters) -> Result<Vec<Job>, FetchError> {
        let prompt = build_prompt(filters);
        info!(model = self.provider.model_name(), filters = %filters.summary(), "requesting job listings");

        let schema = job_list_schema();
        let response = self
            .provider
            .complete_json(&prompt, MAX_TOKENS, &schema)
            .map_err(|e| {
                if e.downcast_ref::<reqwest::Error>().is_some() {
                    FetchError::Transport(format!("{:#}", e))
                } else {
                    FetchError::Provider(format!("{:#}", e))
                }
            })?;

        let jobs = parse_jobs(&response)?;
        info!(count = jobs.len(), "received job listings");
        Ok(jobs)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

fn join_or_any(values: &[String]) -> String {
    if values.is_empty() {
        "不限".to_string()
    } else {
        values.join(", ")
    }
}

pub fn build_prompt(filters: &SearchFilters) -> String {
    let title = if filters.job_title.trim().is_empty() {
        "不限 (latest popular openings)"
    } else {
        filters.job_title.trim()
    };

    format!(
        "Find 20-30 CURRENTLY ACTIVE and OPEN job openings in Taiwan based on these criteria:\n\
        - Job Title Scope: {title}\n\
        - Industries: {industries}\n\
        - Locations: {locations}\n\
        - Experience Levels: {experience}\n\n\
        Search sources MUST include: LinkedIn, 104 Job Bank, 1111 Job Bank, CakeResume, and Yourator.\n\
        Only provide jobs that are confirmed to be currently hiring. Avoid expired listings.\n\n\
        Return a JSON array. Each element is an object with these fields:\n\
        id (unique string), title, company, location, \
        salary (clean numeric range or clear text in TWD), experience (years required), industry, \
        source (one of \"LinkedIn\", \"104\", \"1111\", \"CakeResume\", \"Yourator\", \"Other\"), \
        description, requirements (array of strings), postedAt, link (direct application URL), \
        linkedInEmployees (array of 3 simulated profiles, each {{name, role, url}}), \
        mentorAnalysis (30-50 words on skills, education or traits shared by successful people in this role at this company), \
        companyReviews (objective summary of the company's reputation from public forums such as PTT, Dcard and 求職天眼通).\n\n\
        Use Traditional Chinese for all textual content. Output the JSON array only.",
        industries = join_or_any(&filters.industries),
        locations = join_or_any(&filters.locations),
        experience = join_or_any(&filters.experience_levels),
    )
}

/// Shape of the job array in the schema dialect the Gemini API accepts.
pub fn job_list_schema() -> Value {
    let text = || json!({ "type": "STRING" });
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": text(),
                "title": text(),
                "company": text(),
                "location": text(),
                "salary": text(),
                "experience": text(),
                "industry": text(),
                "source": {
                    "type": "STRING",
                    "enum": ["LinkedIn", "104", "1111", "CakeResume", "Yourator", "Other"]
                },
                "description": text(),
                "requirements": { "type": "ARRAY", "items": text() },
                "postedAt": text(),
                "link": text(),
                "linkedInEmployees": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": { "name": text(), "role": text(), "url": text() },
                        "required": ["name", "role", "url"]
                    }
                },
                "mentorAnalysis": text(),
                "companyReviews": text()
            },
            "required": [
                "id", "title", "company", "location", "salary", "experience",
                "industry", "source", "description", "requirements", "link"
            ]
        }
    })
}

#[derive(serde::Deserialize)]
struct Wrapped {
    jobs: Vec<Job>,
}

/// Extracts the job array from a model response, tolerating code fences,
/// surrounding prose and a `{"jobs": [...]}` wrapper.
pub fn parse_jobs(response: &str) -> Result<Vec<Job>, FetchError> {
    let body = strip_code_fence(response.trim());

    let jobs = match serde_json::from_str::<Vec<Job>>(body) {
        Ok(jobs) => jobs,
        Err(direct_err) => {
            if let Ok(wrapped) = serde_json::from_str::<Wrapped>(body) {
                wrapped.jobs
            } else {
                scan_for_array(body).map_err(|e| {
                    FetchError::Malformed(e.unwrap_or(direct_err).to_string())
                })?
            }
        }
    };

    let mut seen = HashSet::new();
    if let Some(dup) = jobs.iter().find(|job| !seen.insert(job.id.as_str())) {
        return Err(FetchError::Malformed(format!("duplicate job id '{}'", dup.id)));
    }

    Ok(jobs)
}

/// Tries every `[` in `body` as the start of the job array, ignoring
/// whatever trails the first complete value. On failure, returns the error
/// from the first candidate that looked like an array of objects.
fn scan_for_array(body: &str) -> Result<Vec<Job>, Option<serde_json::Error>> {
    let mut first_err = None;
    let mut object_err = None;
    for (start, _) in body.match_indices('[') {
        let candidate = &body[start..];
        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Vec<Job>>();
        match stream.next() {
            // An empty list found after a broken object array is a nested field
            Some(Ok(jobs)) if jobs.is_empty() && object_err.is_some() => {}
            Some(Ok(jobs)) => return Ok(jobs),
            Some(Err(e)) => {
                let opens_object = candidate[1..].trim_start().starts_with('{');
                if opens_object && object_err.is_none() {
                    object_err = Some(e);
                } else if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            None => {}
        }
    }
    Err(object_err.or(first_err))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

// --- Fixture source ---

/// Serves a fixed JSON file regardless of filters. Used for offline runs.
pub struct FixtureSource {
    path: PathBuf,
    label: String,
}

impl FixtureSource {
    pub fn new(path: PathBuf) -> Self {
        let label = format!("fixture:{}", path.display());
        Self { path, label }
    }
}

impl JobSource for FixtureSource {
    fn fetch_jobs(&self, filters: &SearchFilters) -> Result<Vec<Job>, FetchError> {
        debug!(path = %self.path.display(), filters = %filters.summary(), "reading fixture jobs");
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "fixture unreadable");
            FetchError::Transport(format!("{}: {}", self.path.display(), e))
        })?;
        parse_jobs(&raw)
    }

    fn name(&self) -> &str {
        &self.label
    }
}
