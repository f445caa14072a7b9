use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use sqlx::PgPool;

use crate::dal::{scrape_run_db, search_result_db};
use crate::domain::SearchQuery;
use crate::services::ScrapeQuerySender;

#[post("")]
async fn submit_scrape(
    query_sender: web::Data<ScrapeQuerySender>,
    body: web::Json<SearchQuery>,
) -> HttpResponse {
    let query = body.into_inner();
    if query.query.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "error": "query text is required" }));
    }

    match query_sender.sender.send(query) {
        Ok(_) => HttpResponse::Accepted().json(serde_json::json!({ "status": "queued" })),
        Err(e) => {
            log::error!("Found error while sending scrape query: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "scrape worker is unavailable" }))
        }
    }
}

#[derive(Deserialize)]
struct ResultsParams {
    query: String,
}

#[get("/results")]
async fn get_results(
    pool: web::Data<PgPool>,
    params: web::Query<ResultsParams>,
) -> HttpResponse {
    match search_result_db::get_results_for_query(pool.as_ref(), &params.query).await {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(e) => {
            log::error!("Error fetching stored results: {:?}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/runs")]
async fn get_runs(pool: web::Data<PgPool>) -> HttpResponse {
    match scrape_run_db::get_recent_runs(pool.as_ref(), 50).await {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(e) => {
            log::error!("Error fetching recent runs: {:?}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
