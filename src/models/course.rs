use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lecture {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "course_id")]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub thumbnail_url: Option<String>,
    pub lectures: Vec<Lecture>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn new(request: CreateCourseRequest, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: request.title,
            description: request.description,
            category: request.category,
            thumbnail_url: request.thumbnail_url,
            lectures: Vec::new(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, request: UpdateCourseRequest) {
        if let Some(title) = request.title {
            self.title = title;
        }
        if let Some(description) = request.description {
            self.description = description;
        }
        if let Some(category) = request.category {
            self.category = category;
        }
        if let Some(thumbnail_url) = request.thumbnail_url {
            self.thumbnail_url = Some(thumbnail_url);
        }
        self.updated_at = Utc::now();
    }

    pub fn add_lecture(&mut self, request: AddLectureRequest) -> &Lecture {
        self.lectures.push(Lecture {
            id: Uuid::new_v4(),
            title: request.title,
            description: request.description,
            video_url: request.video_url,
            created_at: Utc::now(),
        });
        self.updated_at = Utc::now();
        self.lectures.last().expect("lecture just pushed")
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: String,

    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: String,

    #[validate(length(min = 2, max = 100, message = "Category must be between 2 and 100 characters"))]
    pub category: String,

    #[validate(url(message = "Thumbnail must be a valid URL"))]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 2, max = 100, message = "Category must be between 2 and 100 characters"))]
    pub category: Option<String>,

    #[validate(url(message = "Thumbnail must be a valid URL"))]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddLectureRequest {
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: String,

    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: String,

    #[validate(url(message = "Video must be a valid URL"))]
    pub video_url: String,
}

/// Listing view without lecture content; lectures are gated behind auth.
#[derive(Debug, Serialize)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub thumbnail_url: Option<String>,
    pub lecture_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<Course> for CourseSummary {
    fn from(course: Course) -> Self {
        Self {
            id: course.id,
            title: course.title,
            description: course.description,
            category: course.category,
            thumbnail_url: course.thumbnail_url,
            lecture_count: course.lectures.len(),
            created_at: course.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_course() -> Course {
        Course::new(
            CreateCourseRequest {
                title: "Rust for Backend Developers".to_string(),
                description: "A complete course on backend development in Rust".to_string(),
                category: "Programming".to_string(),
                thumbnail_url: None,
            },
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_add_lecture() {
        let mut course = sample_course();
        course.add_lecture(AddLectureRequest {
            title: "Getting started".to_string(),
            description: "Toolchain setup and project layout".to_string(),
            video_url: "https://cdn.example.com/videos/1.mp4".to_string(),
        });
        assert_eq!(course.lectures.len(), 1);
        assert_eq!(course.lectures[0].title, "Getting started");
    }

    #[test]
    fn test_partial_update() {
        let mut course = sample_course();
        course.update(UpdateCourseRequest {
            title: Some("Advanced Rust".to_string()),
            description: None,
            category: None,
            thumbnail_url: None,
        });
        assert_eq!(course.title, "Advanced Rust");
        assert_eq!(course.category, "Programming");
    }
}
