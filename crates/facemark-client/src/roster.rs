//! Student roster: cached list, search, and CRUD that re-fetches on success.

use crate::api::{Ack, ApiClient, NewStudent, StudentUpdate};
use crate::error::ClientError;
use facemark_core::Student;
use facemark_hw::EncodedImage;

pub const LOAD_FAILED: &str = "Failed to load student data. Please check if the backend is running.";
pub const ADD_FAILED: &str = "Failed to add student";
pub const UPDATE_FAILED: &str = "Failed to update student";
pub const DELETE_FAILED: &str = "Failed to delete student";

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted(Ack),
    Cancelled,
}

/// Students whose name or id contains `query`, ignoring case. An empty
/// query returns everyone.
pub fn filter_students<'a>(students: &'a [Student], query: &str) -> Vec<&'a Student> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return students.iter().collect();
    }
    students.iter().filter(|s| s.matches_search(&needle)).collect()
}

pub struct Roster {
    api: ApiClient,
    students: Vec<Student>,
    query: String,
}

impl Roster {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            students: Vec::new(),
            query: String::new(),
        }
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Cached students matching the current search query.
    pub fn filtered(&self) -> Vec<&Student> {
        filter_students(&self.students, &self.query)
    }

    pub async fn refresh(&mut self) -> Result<&[Student], ClientError> {
        self.students = self.api.list_students().await?;
        tracing::debug!(count = self.students.len(), "roster refreshed");
        Ok(&self.students)
    }

    /// The write already succeeded, so a failed re-fetch only leaves the
    /// cache stale.
    async fn refresh_after_change(&mut self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "roster refresh after change failed");
        }
    }

    pub async fn get(&self, id: &str) -> Result<Student, ClientError> {
        self.api.get_student(id).await
    }

    /// Create a student; name, id and image must all be present.
    pub async fn create(&mut self, student: NewStudent) -> Result<Ack, ClientError> {
        student.validate()?;
        let ack = self.api.add_student(&student).await?;
        tracing::info!(id = %student.id, name = %student.name, "student added");
        self.refresh_after_change().await;
        Ok(ack)
    }

    /// Create a student with the photo sent inline as base64.
    pub async fn create_inline(
        &mut self,
        name: &str,
        id: &str,
        image: &EncodedImage,
    ) -> Result<Ack, ClientError> {
        NewStudent {
            name: name.to_string(),
            id: id.to_string(),
            image: Some(image.clone()),
        }
        .validate()?;
        let ack = self.api.add_student_base64(name.trim(), id.trim(), image).await?;
        tracing::info!(id, name, "student added (inline image)");
        self.refresh_after_change().await;
        Ok(ack)
    }

    pub async fn update(&mut self, id: &str, update: StudentUpdate) -> Result<Ack, ClientError> {
        update.validate()?;
        let ack = self.api.update_student(id, &update).await?;
        tracing::info!(id, new_id = %update.new_id, image = update.image.is_some(), "student updated");
        self.refresh_after_change().await;
        Ok(ack)
    }

    /// Delete after `confirm` approves the student. Declining makes no request.
    pub async fn delete<F>(&mut self, id: &str, confirm: F) -> Result<DeleteOutcome, ClientError>
    where
        F: FnOnce(&Student) -> bool,
    {
        let student = match self.students.iter().find(|s| s.id == id) {
            Some(s) => s.clone(),
            None => self.api.get_student(id).await?,
        };
        if !confirm(&student) {
            tracing::debug!(id, "delete cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }
        let ack = self.api.delete_student(id).await?;
        tracing::info!(id, "student deleted");
        self.refresh_after_change().await;
        Ok(DeleteOutcome::Deleted(ack))
    }

    #[cfg(test)]
    fn with_students(api: ApiClient, students: Vec<Student>) -> Self {
        Self {
            api,
            students,
            query: String::new(),
        }
    }
}
