//! Attachment operations for Jira API.

use rand::RngExt;
use tracing::info;

use super::{JiraClient, check_status};
use crate::error::JiraError;

impl JiraClient {
    /// Attach a file to an issue.
    pub fn add_attachment(
        &self,
        key: &str,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), JiraError> {
        let url = format!("{}/issue/{}/attachments", self.api_url(), key);

        info!("Uploading attachment '{}' to {}", filename, key);

        let boundary = format!(
            "----RedmigFormBoundary{:016x}",
            rand::rng().random::<u64>()
        );
        let body = multipart_body(&boundary, filename, data, content_type);

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .header("X-Atlassian-Token", "no-check")
            .header("Accept", "application/json")
            .send(&body[..])?;

        check_status(response)
    }
}

fn multipart_body(boundary: &str, filename: &str, data: &[u8], content_type: &str) -> Vec<u8> {
    let filename = filename.replace('"', "%22");
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_body_ends_with_boundary() {
        let body = multipart_body("B", "log.txt", b"line", "text/plain");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--B\r\n"));
        assert!(text.contains("filename=\"log.txt\""));
        assert!(text.ends_with("line\r\n--B--\r\n"));
    }
}
