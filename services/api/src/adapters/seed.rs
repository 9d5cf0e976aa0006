//! services/api/src/adapters/seed.rs
//!
//! Course and roster data for the `memory` storage backend, read from a JSON file
//! of the form `{ "courses": [...], "enrollments": [...] }`.

use attendance_core::memory::InMemoryDirectory;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub courses: Vec<SeedCourse>,
    #[serde(default)]
    pub enrollments: Vec<SeedEnrollment>,
}

#[derive(Debug, Deserialize)]
pub struct SeedCourse {
    pub id: String,
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedEnrollment {
    pub class_name: String,
    pub student_id: String,
    #[serde(default)]
    pub display_name: String,
}

impl SeedData {
    pub fn from_file(path: &Path) -> Result<Self, ApiError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            ApiError::Internal(format!("Invalid seed file {}: {}", path.display(), e))
        })
    }

    /// Loads everything into `directory`.
    pub fn apply(&self, directory: &InMemoryDirectory) {
        for course in &self.courses {
            directory.add_course(
                &course.id,
                course.name.as_deref(),
                course.class_name.as_deref(),
                course.owner_id.as_deref(),
            );
        }
        for enrollment in &self.enrollments {
            directory.enroll(
                &enrollment.class_name,
                &enrollment.student_id,
                &enrollment.display_name,
            );
        }
        info!(
            courses = self.courses.len(),
            enrollments = self.enrollments.len(),
            "Seeded in-memory directory"
        );
    }
}
