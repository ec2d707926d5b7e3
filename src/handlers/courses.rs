use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::common::ApiResponse;
use crate::models::course::{
    AddLectureRequest, Course, CourseSummary, CreateCourseRequest, UpdateCourseRequest,
};
use crate::services::database::DatabaseService;

#[derive(Serialize)]
struct CourseListPayload {
    courses: Vec<CourseSummary>,
}

#[derive(Serialize)]
struct CoursePayload {
    course: Course,
}

/// Public catalogue; lecture content is only exposed on the authed detail route.
#[get("")]
pub async fn list_courses(db: Data<DatabaseService>) -> Result<HttpResponse, ApiError> {
    let courses = db.list_courses().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(CourseListPayload {
        courses: courses.into_iter().map(Into::into).collect(),
    })))
}

#[get("/{course_id}")]
pub async fn get_course(
    db: Data<DatabaseService>,
    _caller: AuthenticatedUser,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let course_id = path.into_inner();
    let course = db
        .get_course(&course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(CoursePayload { course })))
}

#[post("")]
pub async fn create_course(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    payload: Json<CreateCourseRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    payload.validate()?;

    let course = Course::new(payload.into_inner(), caller.user_id);
    let course = db.create_course(&course).await?;
    log::info!("course {} created by {}", course.id, caller.user_id);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        CoursePayload { course },
        "Course created successfully",
    )))
}

#[put("/{course_id}")]
pub async fn update_course(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
    payload: Json<UpdateCourseRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    payload.validate()?;

    let course_id = path.into_inner();
    let mut course = db
        .get_course(&course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;
    course.update(payload.into_inner());
    let course = db.update_course(&course).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        CoursePayload { course },
        "Course updated successfully",
    )))
}

#[delete("/{course_id}")]
pub async fn delete_course(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;

    let course_id = path.into_inner();
    if db.get_course(&course_id).await?.is_none() {
        return Err(ApiError::not_found("Course not found"));
    }
    db.delete_course(&course_id).await?;
    log::info!("course {course_id} deleted by {}", caller.user_id);

    Ok(HttpResponse::Ok().json(ApiResponse::<()>::message_only(
        "Course deleted successfully",
    )))
}

#[post("/{course_id}/lectures")]
pub async fn add_lecture(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
    payload: Json<AddLectureRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    payload.validate()?;

    let course_id = path.into_inner();
    let mut course = db
        .get_course(&course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;
    course.add_lecture(payload.into_inner());
    let course = db.update_course(&course).await?;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        CoursePayload { course },
        "Lecture added successfully",
    )))
}
