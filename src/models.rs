use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Where a listing was posted. Anything the model reports outside the known
/// boards collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    LinkedIn,
    #[serde(rename = "104", alias = "104 Job Bank", alias = "104人力銀行")]
    Bank104,
    #[serde(rename = "1111", alias = "1111 Job Bank", alias = "1111人力銀行")]
    Bank1111,
    CakeResume,
    Yourator,
    #[serde(other)]
    Other,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Platform::LinkedIn => "LinkedIn",
            Platform::Bank104 => "104",
            Platform::Bank1111 => "1111",
            Platform::CakeResume => "CakeResume",
            Platform::Yourator => "Yourator",
            Platform::Other => "Other",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedInProfile {
    pub name: String,
    pub role: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub salary: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub experience: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub industry: String,
    pub source: Platform,
    pub description: String,
    pub requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<String>,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_in_employees: Option<Vec<LinkedInProfile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentor_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_reviews: Option<String>,
}

// Models often send `null` for a detail they could not find.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Lifecycle of the current (or last finished) search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadingState {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl fmt::Display for LoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadingState::Idle => write!(f, "idle"),
            LoadingState::Loading => write!(f, "loading"),
            LoadingState::Success => write!(f, "success"),
            LoadingState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_job(id: &str) -> Job {
    Job {
        id: id.to_string(),
        title: format!("Backend Engineer {}", id),
        company: "Acme Taiwan".to_string(),
        location: "台北市".to_string(),
        salary: "NT$ 1,200,000 - 1,800,000".to_string(),
        experience: "3-5年".to_string(),
        industry: "軟體及網路".to_string(),
        source: Platform::Bank104,
        description: "Build and operate services.".to_string(),
        requirements: vec!["Rust".to_string(), "PostgreSQL".to_string()],
        posted_at: None,
        link: format!("https://example.com/jobs/{}", id),
        linked_in_employees: None,
        mentor_analysis: None,
        company_reviews: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_deserializes_camel_case_payload() {
        let raw = r#"{
            "id": "job-1",
            "title": "資深後端工程師",
            "company": "Acme",
            "location": "台北市",
            "salary": "月薪 70,000 - 90,000",
            "experience": "3年以上",
            "industry": "軟體及網路",
            "source": "CakeResume",
            "description": "負責 API 開發",
            "requirements": ["Go", "Kubernetes"],
            "postedAt": "2 天前",
            "link": "https://www.cakeresume.com/jobs/1",
            "linkedInEmployees": [{"name": "王小明", "role": "Tech Lead", "url": "https://linkedin.com/in/x"}],
            "mentorAnalysis": "多數具備雲端背景",
            "companyReviews": "評價普遍正面"
        }"#;

        let job: Job = serde_json::from_str(raw).unwrap();
        assert_eq!(job.source, Platform::CakeResume);
        assert_eq!(job.posted_at.as_deref(), Some("2 天前"));
        assert_eq!(job.linked_in_employees.as_ref().map(Vec::len), Some(1));
        assert_eq!(job.company_reviews.as_deref(), Some("評價普遍正面"));
    }

    #[test]
    fn test_job_defaults_optional_text_fields() {
        let raw = r#"{
            "id": "job-2",
            "title": "PM",
            "company": "Acme",
            "source": "LinkedIn",
            "description": "",
            "requirements": [],
            "link": "https://linkedin.com/jobs/2"
        }"#;

        let job: Job = serde_json::from_str(raw).unwrap();
        assert!(job.location.is_empty());
        assert!(job.salary.is_empty());
        assert!(job.mentor_analysis.is_none());
    }

    #[test]
    fn test_job_accepts_null_detail_fields() {
        let raw = r#"{
            "id": "job-3",
            "title": "數據分析師",
            "company": "Acme",
            "location": null,
            "salary": null,
            "experience": null,
            "industry": null,
            "source": "Yourator",
            "description": "分析使用者行為",
            "requirements": ["SQL"],
            "postedAt": null,
            "link": "https://www.yourator.co/jobs/3"
        }"#;

        let job: Job = serde_json::from_str(raw).unwrap();
        assert!(job.location.is_empty());
        assert!(job.salary.is_empty());
        assert!(job.experience.is_empty());
        assert!(job.industry.is_empty());
        assert!(job.posted_at.is_none());
    }

    #[test]
    fn test_job_rejects_null_title() {
        let raw = r#"{"id": "job-4", "title": null, "company": "Acme", "source": "LinkedIn",
            "description": "", "requirements": [], "link": "x"}"#;
        assert!(serde_json::from_str::<Job>(raw).is_err());
    }

    #[test]
    fn test_job_requires_id() {
        let raw = r#"{"title": "PM", "company": "Acme", "source": "LinkedIn",
            "description": "", "requirements": [], "link": "x"}"#;
        assert!(serde_json::from_str::<Job>(raw).is_err());
    }

    #[test]
    fn test_platform_aliases_and_unknown() {
        let p: Platform = serde_json::from_str("\"104 Job Bank\"").unwrap();
        assert_eq!(p, Platform::Bank104);
        let p: Platform = serde_json::from_str("\"1111\"").unwrap();
        assert_eq!(p, Platform::Bank1111);
        let p: Platform = serde_json::from_str("\"Indeed\"").unwrap();
        assert_eq!(p, Platform::Other);
        assert_eq!(serde_json::to_string(&Platform::Bank104).unwrap(), "\"104\"");
    }
}
