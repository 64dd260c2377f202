//! HTTP-backed extractor client. Talks to the extraction service configured
//! via `EXTRACTOR_URL`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::extraction::{ExtractError, ScanProbe, SectionExtractor};
use crate::models::snapshot::{Section, SectionRecord};

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    subject_id: &'a str,
    section: Section,
    deep: bool,
}

pub struct RemoteExtractor {
    client: Client,
    base_url: String,
}

impl RemoteExtractor {
    pub fn new(base_url: String) -> Self {
        RemoteExtractor {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &ExtractRequest<'_>,
    ) -> Result<T, ExtractError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        debug!(path, section = %body.section, "extractor responded");
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl SectionExtractor for RemoteExtractor {
    async fn scan(&self, subject_id: &str, section: Section) -> Result<ScanProbe, ExtractError> {
        self.post(
            "scan",
            &ExtractRequest {
                subject_id,
                section,
                deep: false,
            },
        )
        .await
    }

    async fn extract(
        &self,
        subject_id: &str,
        section: Section,
    ) -> Result<SectionRecord, ExtractError> {
        self.post(
            "extract",
            &ExtractRequest {
                subject_id,
                section,
                deep: false,
            },
        )
        .await
    }

    async fn extract_deep(
        &self,
        subject_id: &str,
        section: Section,
    ) -> Result<SectionRecord, ExtractError> {
        self.post(
            "extract",
            &ExtractRequest {
                subject_id,
                section,
                deep: true,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let extractor = RemoteExtractor::new("http://localhost:9000/".to_string());
        assert_eq!(extractor.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_request_serializes_section_name() {
        let req = ExtractRequest {
            subject_id: "subject-1",
            section: Section::About,
            deep: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["section"], "about");
        assert_eq!(json["deep"], true);
    }
}
