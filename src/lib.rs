pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    class_service::ClassService, quiz_service::QuizService, review_service::ReviewService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub quiz_service: QuizService,
    pub class_service: ClassService,
    pub review_service: ReviewService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let quiz_service = QuizService::new(pool.clone());
        let class_service = ClassService::new(pool.clone());
        let review_service = ReviewService::new(pool.clone());

        Self {
            pool,
            quiz_service,
            class_service,
            review_service,
        }
    }
}
