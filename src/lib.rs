// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! RevOS: backend for a student productivity assistant.
//!
//! This crate provides the HTTP API that ingests course syllabi, answers
//! questions about them, and blends in calendar and bank data.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use error::AppError;
use services::{
    Assistant, CanvasClient, GoogleCalendarClient, GoogleCalendarService, OpenAiClient,
    PineconeClient, PlaidClient, SyllabusService,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub openai: OpenAiClient,
    pub pinecone: PineconeClient,
    pub syllabus_service: SyllabusService,
    pub assistant: Assistant,
    pub google_calendar: GoogleCalendarService,
    pub plaid: PlaidClient,
    pub canvas: CanvasClient,
}

impl AppState {
    /// Build every integration client from configuration.
    pub fn new(config: Config, db: Database) -> Result<Self, AppError> {
        let openai = OpenAiClient::new(&config)?;
        let pinecone = PineconeClient::new(&config);
        let syllabus_service = SyllabusService::new(openai.clone(), pinecone.clone(), db.clone());
        let assistant = Assistant::new(openai.clone(), pinecone.clone(), db.clone());
        let google_calendar =
            GoogleCalendarService::new(GoogleCalendarClient::new(&config), db.clone());
        let plaid = PlaidClient::new(&config);
        let canvas = CanvasClient::new(&config)?;

        Ok(Self {
            config,
            db,
            openai,
            pinecone,
            syllabus_service,
            assistant,
            google_calendar,
            plaid,
            canvas,
        })
    }
}
