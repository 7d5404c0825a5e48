use serde::{Deserialize, Serialize};

pub const INDUSTRIES: &[&str] = &[
    "軟體及網路",
    "半導體",
    "電子製造",
    "金融保險",
    "電子商務",
    "遊戲",
    "醫療生技",
    "行銷廣告",
    "教育",
    "傳統製造",
];

pub const REGIONS: &[&str] = &[
    "台北市",
    "新北市",
    "桃園市",
    "新竹縣市",
    "台中市",
    "台南市",
    "高雄市",
    "遠端工作",
];

pub const EXPERIENCE_LEVELS: &[&str] = &[
    "不拘",
    "1年以下",
    "1-3年",
    "3-5年",
    "5-10年",
    "10年以上",
];

/// Search criteria as entered by the user. Every field may be empty, which
/// means "no constraint" for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub job_title: String,
    pub industries: Vec<String>,
    pub locations: Vec<String>,
    pub experience_levels: Vec<String>,
}

impl SearchFilters {
    pub fn with_job_title(self, job_title: impl Into<String>) -> Self {
        Self {
            job_title: job_title.into(),
            ..self
        }
    }

    pub fn with_industries(self, industries: Vec<String>) -> Self {
        Self { industries, ..self }
    }

    pub fn with_locations(self, locations: Vec<String>) -> Self {
        Self { locations, ..self }
    }

    pub fn with_experience_levels(self, experience_levels: Vec<String>) -> Self {
        Self {
            experience_levels,
            ..self
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.job_title.trim().is_empty()
            && self.industries.is_empty()
            && self.locations.is_empty()
            && self.experience_levels.is_empty()
    }

    /// One-line summary for status bars and logs.
    pub fn summary(&self) -> String {
        let title = if self.job_title.trim().is_empty() {
            "最新熱門"
        } else {
            self.job_title.trim()
        };
        let mut parts = vec![title.to_string()];
        for group in [&self.industries, &self.locations, &self.experience_levels] {
            if !group.is_empty() {
                parts.push(group.join("/"));
            }
        }
        parts.join(" | ")
    }
}

/// Multi-select toggle: drops `option` if selected, appends it otherwise.
pub fn toggle_option(selected: &[String], option: &str) -> Vec<String> {
    if selected.iter().any(|s| s == option) {
        selected.iter().filter(|s| *s != option).cloned().collect()
    } else {
        let mut next = selected.to_vec();
        next.push(option.to_string());
        next
    }
}

/// Normalizes repeated CLI values into a selection without duplicates.
pub fn dedup_selection(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
