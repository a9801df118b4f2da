//! Outbound request options

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::error::{RestError, RestResult};

/// Header carrying the audit-log reason for write calls
pub const AUDIT_LOG_REASON: &str = "x-audit-log-reason";

/// A file uploaded alongside a request
#[derive(Debug, Clone)]
pub struct AttachmentFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl AttachmentFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            content_type: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Body, query, headers and attachments of one REST call.
///
/// With no files the body is sent as JSON. With files the call becomes a
/// multipart form and the JSON body rides along as the `payload_json` field.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) body: Option<Value>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) reason: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) files: Vec<AttachmentFile>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the JSON body
    ///
    /// # Errors
    /// Returns an error if `body` cannot be represented as JSON.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> RestResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Set the JSON body from an already built value
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Audit-log reason, sent as `X-Audit-Log-Reason`
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Add an extra header
    ///
    /// # Errors
    /// Returns [`RestError::InvalidHeader`] if the name or value is not a valid header.
    pub fn header(mut self, name: &str, value: &str) -> RestResult<Self> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| RestError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| RestError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    #[must_use]
    pub fn file(mut self, file: AttachmentFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn is_multipart(&self) -> bool {
        !self.files.is_empty()
    }

    /// Multipart form for a call with attachments
    pub(crate) fn multipart_form(&self) -> RestResult<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();

        if let Some(body) = &self.body {
            form = form.text("payload_json", serde_json::to_string(body)?);
        }

        for (index, file) in self.files.iter().enumerate() {
            let mut part =
                reqwest::multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
            if let Some(content_type) = &file.content_type {
                part = part.mime_str(content_type)?;
            }
            form = form.part(format!("files[{index}]"), part);
        }

        Ok(form)
    }
}
