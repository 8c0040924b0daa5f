//! REST wrapper over the recognition backend.
//!
//! One method per route; responses are decoded from JSON and non-2xx
//! statuses become [`ClientError::Backend`] carrying the `detail` field.

use crate::error::{backend_detail, ClientError};
use facemark_core::{AttendanceRecord, NewAttendance, RecognitionResult, Status, Student, Tolerance};
use facemark_hw::EncodedImage;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Acknowledgement body returned by mutating routes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ack {
    pub message: String,
}

/// Fields for creating a student. All three are required.
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub name: String,
    pub id: String,
    pub image: Option<EncodedImage>,
}

impl NewStudent {
    pub(crate) fn validate(&self) -> Result<&EncodedImage, ClientError> {
        match &self.image {
            Some(image) if !self.name.trim().is_empty() && !self.id.trim().is_empty() => Ok(image),
            _ => Err(ClientError::Validation(
                "Please fill all fields and provide an image".into(),
            )),
        }
    }
}

/// Fields for editing a student. Name and id are required; the image is
/// only replaced when one is given.
#[derive(Debug, Clone, Default)]
pub struct StudentUpdate {
    pub name: String,
    pub new_id: String,
    pub image: Option<EncodedImage>,
}

impl StudentUpdate {
    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.name.trim().is_empty() || self.new_id.trim().is_empty() {
            return Err(ClientError::Validation(
                "Please fill all required fields".into(),
            ));
        }
        Ok(())
    }
}

/// Server-side filters accepted by `GET /attendance`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

#[derive(Debug, Serialize)]
struct InlineStudent<'a> {
    name: &'a str,
    id: &'a str,
    image: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct InlineRecognition {
    pub image: String,
    pub tolerance: Tolerance,
}

/// Anything that can turn a still into a recognition result.
///
/// Implemented by [`ApiClient`]; the poller is generic over it.
pub trait RecognitionBackend: Send + Sync + 'static {
    fn recognize(
        &self,
        image: &EncodedImage,
        tolerance: Tolerance,
    ) -> impl Future<Output = Result<RecognitionResult, ClientError>> + Send;
}

/// Clone-safe handle to the backend.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        tracing::debug!(base = base_url, ?timeout, "api client ready");
        Self::with_http(base_url, http)
    }

    /// Use a preconfigured `reqwest::Client` (proxy, TLS roots, timeouts).
    pub fn with_http(base_url: &str, http: reqwest::Client) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("invalid api url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Config(format!("invalid api url {base_url}")));
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = backend_detail(&body);
            tracing::warn!(%url, status = status.as_u16(), detail = ?detail, "backend error");
            return Err(ClientError::Backend {
                status: status.as_u16(),
                detail,
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(format!("{url}: {e}")))
    }

    // --- Students ---

    pub async fn list_students(&self) -> Result<Vec<Student>, ClientError> {
        self.send(self.http.get(self.url(&["students"]))).await
    }

    pub async fn get_student(&self, id: &str) -> Result<Student, ClientError> {
        self.send(self.http.get(self.url(&["students", id]))).await
    }

    /// `POST /students` as multipart `name`, `student_id`, `image`.
    pub async fn add_student(&self, student: &NewStudent) -> Result<Ack, ClientError> {
        let image = student.validate()?;
        let form = Form::new()
            .text("name", student.name.trim().to_string())
            .text("student_id", student.id.trim().to_string())
            .part("image", image_part(image)?);
        self.send(self.http.post(self.url(&["students"])).multipart(form))
            .await
    }

    /// `POST /students/base64` with the image inline.
    pub async fn add_student_base64(
        &self,
        name: &str,
        id: &str,
        image: &EncodedImage,
    ) -> Result<Ack, ClientError> {
        let body = InlineStudent {
            name,
            id,
            image: image.to_data_url(),
        };
        self.send(self.http.post(self.url(&["students", "base64"])).json(&body))
            .await
    }

    /// `PUT /students/{id}` as multipart `name`, `new_id`, optional `image`.
    pub async fn update_student(&self, id: &str, update: &StudentUpdate) -> Result<Ack, ClientError> {
        update.validate()?;
        let mut form = Form::new()
            .text("name", update.name.trim().to_string())
            .text("new_id", update.new_id.trim().to_string());
        if let Some(image) = &update.image {
            form = form.part("image", image_part(image)?);
        }
        self.send(self.http.put(self.url(&["students", id])).multipart(form))
            .await
    }

    pub async fn delete_student(&self, id: &str) -> Result<Ack, ClientError> {
        self.send(self.http.delete(self.url(&["students", id]))).await
    }

    // --- Recognition ---

    /// `POST /recognize` with the still as a multipart file.
    pub async fn recognize_file(
        &self,
        image: &EncodedImage,
        tolerance: Tolerance,
    ) -> Result<RecognitionResult, ClientError> {
        let form = Form::new().part("image", image_part(image)?);
        let request = self
            .http
            .post(self.url(&["recognize"]))
            .query(&[("tolerance", tolerance.value())])
            .multipart(form);
        self.send(request).await
    }

    /// `POST /recognize/base64` with `{image, tolerance}`.
    pub async fn recognize_base64(
        &self,
        image: &EncodedImage,
        tolerance: Tolerance,
    ) -> Result<RecognitionResult, ClientError> {
        let body = InlineRecognition {
            image: image.to_data_url(),
            tolerance,
        };
        let result: RecognitionResult = self
            .send(self.http.post(self.url(&["recognize", "base64"])).json(&body))
            .await?;
        tracing::debug!(name = %result.name, id = %result.id, %tolerance, "recognition result");
        Ok(result)
    }

    // --- Attendance ---

    pub async fn attendance(&self, query: &ServerQuery) -> Result<Vec<AttendanceRecord>, ClientError> {
        self.send(self.http.get(self.url(&["attendance"])).query(query))
            .await
    }

    pub async fn mark_attendance(&self, record: &NewAttendance) -> Result<Ack, ClientError> {
        self.send(self.http.post(self.url(&["attendance"])).json(record))
            .await
    }

    // --- Dataset ---

    pub async fn rebuild_dataset(&self) -> Result<Ack, ClientError> {
        self.send(self.http.post(self.url(&["dataset", "rebuild"])))
            .await
    }
}

impl RecognitionBackend for ApiClient {
    fn recognize(
        &self,
        image: &EncodedImage,
        tolerance: Tolerance,
    ) -> impl Future<Output = Result<RecognitionResult, ClientError>> + Send {
        self.recognize_base64(image, tolerance)
    }
}

fn image_part(image: &EncodedImage) -> Result<Part, ClientError> {
    Ok(Part::bytes(image.bytes.clone())
        .file_name("capture.jpg")
        .mime_str(EncodedImage::MIME)?)
}
