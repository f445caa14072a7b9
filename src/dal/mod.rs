pub mod scrape_run_db;
pub mod search_result_db;
