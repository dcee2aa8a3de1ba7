use crate::error::{paginated, ApiError};
use crate::helper::activity_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::PageRequest;
use crate::DbPool;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/activities", web::get().to(list_activities));
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    #[serde(rename = "type")]
    activity_type: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_activities(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    query: web::Query<ActivityQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let conn = pool.get()?;
    let page = activity_helpers::list_for(&conn, &user, query.activity_type, PageRequest::new(query.page, query.limit))?;
    Ok(paginated("Activities retrieved.", page))
}
