// Upload endpoints of the HTTP client

use crate::http::HttpClient;
use crate::rest::UploadResponse;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tabula_core::Result;

pub const USER_HEADER: &str = "x-tabula-user";

/// A file to send, with the content type it should be declared as.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub content_type: String,
    pub contents: Bytes,
}

impl FilePayload {
    pub fn csv(contents: impl Into<Bytes>) -> Self {
        Self {
            content_type: "text/csv".to_string(),
            contents: contents.into(),
        }
    }
}

impl HttpClient {
    pub async fn create_upload(
        &self,
        table_name: &str,
        file: FilePayload,
        user: Option<&str>,
    ) -> Result<UploadResponse> {
        let url = self.url(&format!(
            "/api/v1/uploads?table={}",
            urlencoding::encode(table_name)
        ));
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, file.content_type)
            .body(file.contents);
        if let Some(user) = user {
            request = request.header(USER_HEADER, user);
        }
        self.send_json(request).await
    }

    /// Re-upload and/or rename. Without a file only the name changes.
    pub async fn update_upload(
        &self,
        id: u64,
        table_name: Option<&str>,
        file: Option<FilePayload>,
    ) -> Result<UploadResponse> {
        let path = match table_name {
            Some(name) => format!("/api/v1/uploads/{}?table={}", id, urlencoding::encode(name)),
            None => format!("/api/v1/uploads/{}", id),
        };
        let mut request = self.client.put(self.url(&path));
        if let Some(file) = file {
            request = request
                .header(CONTENT_TYPE, file.content_type)
                .body(file.contents);
        }
        self.send_json(request).await
    }

    pub async fn get_upload(&self, id: u64) -> Result<UploadResponse> {
        self.send_json(self.client.get(self.url(&format!("/api/v1/uploads/{}", id))))
            .await
    }

    pub async fn list_uploads(&self) -> Result<Vec<UploadResponse>> {
        self.send_json(self.client.get(self.url("/api/v1/uploads"))).await
    }

    pub async fn delete_upload(&self, id: u64) -> Result<UploadResponse> {
        self.send_json(self.client.delete(self.url(&format!("/api/v1/uploads/{}", id))))
            .await
    }
}
