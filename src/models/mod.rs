// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod assignment;
pub mod calendar;
pub mod finance;
pub mod syllabus;
pub mod user;

pub use assignment::{AssignmentCategory, Priority, TriagedAssignment};
pub use calendar::{CalendarEvent, CalendarSummary, CreatedEvent, FeedEvent, FeedEventKind};
pub use finance::{
    BankAccount, CategoryTotal, LinkToken, RecurringTransaction, SpendingInsights, Transaction,
};
pub use syllabus::{GradingCategory, KeyDate, NewSyllabus, ParsedSyllabus, Syllabus};
pub use user::{User, UserResponse};
