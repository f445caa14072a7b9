use std::net::TcpListener;

use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;

use crate::{
    routes::{default_route, scrape_route},
    services::ScrapeQuerySender,
};

pub fn run(
    listener: TcpListener,
    db_pool: PgPool,
    query_sender: ScrapeQuerySender,
) -> Result<Server, std::io::Error> {
    let db_pool = web::Data::new(db_pool);
    let query_sender = web::Data::new(query_sender);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .service(default_route::default)
            .service(
                web::scope("/scrape")
                    .service(scrape_route::submit_scrape)
                    .service(scrape_route::get_results)
                    .service(scrape_route::get_runs),
            )
            .app_data(db_pool.clone())
            .app_data(query_sender.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
