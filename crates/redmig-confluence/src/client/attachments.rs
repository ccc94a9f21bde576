//! Attachment operations for Confluence API.

use rand::RngExt;
use tracing::info;

use super::{ConfluenceClient, check_status};
use crate::error::ConfluenceError;

impl ConfluenceClient {
    /// Upload a new attachment to a page.
    ///
    /// A file with the same name already on the page is reported by
    /// Confluence as a 400 error mentioning the "same file name".
    pub fn upload_attachment(
        &self,
        page_id: &str,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), ConfluenceError> {
        let url = format!("{}/content/{}/child/attachment", self.rest_url(), page_id);

        info!("Uploading attachment '{}' to page {}", filename, page_id);

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
            .header("X-Atlassian-Token", "nocheck")
            .header("Accept", "application/json")
            .send(&body[..])?;

        check_status(response)
    }
}

/// Single-file `multipart/form-data` body.
pub(crate) fn multipart_body(
    boundary: &str,
    filename: &str,
    data: &[u8],
    content_type: &str,
) -> Vec<u8> {
    let filename = filename.replace('"', "%22");
    let mut body = Vec::with_capacity(data.len() + 256);

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_multipart_body() {
        let body = multipart_body("XYZ", "a \"b\".png", b"\x89PNG", "image/png");
        let expected = b"--XYZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a %22b%22.png\"\r\n\
Content-Type: image/png\r\n\r\n\x89PNG\r\n--XYZ--\r\n";
        assert_eq!(body, expected.to_vec());
    }
}
