// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Canvas calendar feed import.
//!
//! Handles:
//! - Fetching an iCalendar (RFC 5545) feed
//! - Line unfolding, `VEVENT` parsing and text unescaping
//! - Event classification and course code extraction
//! - Conversion of typed events into syllabus key dates

use crate::config::Config;
use crate::error::AppError;
use crate::models::syllabus::course_id_for;
use crate::models::{FeedEvent, FeedEventKind, KeyDate, NewSyllabus};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;
use std::time::Duration;

const SERVICE: &str = "canvas";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 5;
/// Largest feed body accepted (5 MiB).
pub const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
/// Path segment every Canvas calendar feed URL carries.
const FEED_PATH: &str = "/feeds/calendars/";
pub const IMPORTED_SEMESTER: &str = "Imported from Canvas";
/// Course name for typed events that carry no course code.
pub const UNSORTED_COURSE: &str = "Canvas Calendar";

/// Letters, optional dash, digits: `CSCE-120`, `CHEM 107`, `MATH151`.
static COURSE_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([A-Z]{2,})\s*-?\s*(\d+)").ok());

/// Ordered summary rules. The first match wins.
const KIND_RULES: &[(FeedEventKind, &[&str])] = &[
    (FeedEventKind::Homework, &["[hw]", "homework", "assignment"]),
    (FeedEventKind::Exam, &["exam", "midterm", "final"]),
    (FeedEventKind::Quiz, &["quiz"]),
    (FeedEventKind::Lab, &["lab", "laboratory"]),
    (FeedEventKind::Project, &["project", "presentation"]),
];

/// Calendar feed fetcher.
#[derive(Clone)]
pub struct CanvasClient {
    http: reqwest::Client,
    allow_private_hosts: bool,
}

impl CanvasClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let allow_private_hosts = config.canvas_allow_private_hosts;
        let redirect = if allow_private_hosts {
            reqwest::redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            reqwest::redirect::Policy::custom(|attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else if check_host(attempt.url(), false).is_err() {
                    attempt.stop()
                } else {
                    attempt.follow()
                }
            })
        };

        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(redirect)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;
        Ok(Self {
            http,
            allow_private_hosts,
        })
    }

    /// Validate a feed URL against this client's host policy.
    pub fn validate_url(&self, raw: &str) -> Result<reqwest::Url, AppError> {
        validate_feed_url(raw, self.allow_private_hosts)
    }

    /// Download the feed body, at most [`MAX_FEED_BYTES`].
    pub async fn fetch_feed(&self, url: &reqwest::Url) -> Result<String, AppError> {
        let host = url.host_str().unwrap_or("");
        tracing::info!(host, "Fetching calendar feed");

        if !self.allow_private_hosts {
            self.check_resolved(url).await?;
        }

        let mut response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(host, error = %e, "Calendar feed request failed");
                AppError::upstream(SERVICE, "feed request failed")
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(host, status = status.as_u16(), "Calendar feed returned error status");
            return Err(AppError::upstream(SERVICE, "feed request failed"));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_FEED_BYTES as u64)
        {
            return Err(AppError::upstream(SERVICE, "feed exceeds size limit"));
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::upstream(SERVICE, e.to_string()))?
        {
            if body.len() + chunk.len() > MAX_FEED_BYTES {
                return Err(AppError::upstream(SERVICE, "feed exceeds size limit"));
            }
            body.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&body).into_owned();
        if !body.contains("BEGIN:VCALENDAR") {
            return Err(AppError::upstream(SERVICE, "response is not an iCalendar feed"));
        }
        Ok(body)
    }

    /// Reject host names that resolve to non-public addresses.
    async fn check_resolved(&self, url: &reqwest::Url) -> Result<(), AppError> {
        let Some(host) = url.host_str() else {
            return Err(AppError::BadRequest("calendar_url has no host".to_string()));
        };
        if host_ip(host).is_some() {
            return Ok(());
        }

        let port = url.port_or_known_default().unwrap_or(443);
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| AppError::upstream(SERVICE, format!("cannot resolve host: {}", e)))?;
        for addr in addrs {
            if !is_public_ip(addr.ip()) {
                tracing::warn!(host, ip = %addr.ip(), "Calendar feed host resolves to a private address");
                return Err(AppError::BadRequest(
                    "calendar_url must point to a public host".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Validate a feed URL: http(s), a Canvas feed path, and unless
/// `allow_private_hosts` is set, a host outside loopback and private ranges.
pub fn validate_feed_url(raw: &str, allow_private_hosts: bool) -> Result<reqwest::Url, AppError> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|_| AppError::BadRequest("calendar_url is not a valid URL".to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::BadRequest(
            "calendar_url must use http or https".to_string(),
        ));
    }
    check_host(&url, allow_private_hosts)?;
    if !url.path().contains(FEED_PATH) {
        return Err(AppError::BadRequest(
            "calendar_url is not a Canvas calendar feed".to_string(),
        ));
    }
    Ok(url)
}

fn check_host(url: &reqwest::Url, allow_private_hosts: bool) -> Result<(), AppError> {
    let host = url.host_str().unwrap_or("");
    if host.is_empty() {
        return Err(AppError::BadRequest("calendar_url has no host".to_string()));
    }
    if allow_private_hosts {
        return Ok(());
    }

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let private = match host_ip(&host) {
        Some(ip) => !is_public_ip(ip),
        None => host == "localhost" || host.ends_with(".localhost"),
    };
    if private {
        return Err(AppError::BadRequest(
            "calendar_url must point to a public host".to_string(),
        ));
    }
    Ok(())
}

/// IP literal host, IPv6 with or without brackets.
fn host_ip(host: &str) -> Option<IpAddr> {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    // 100.64.0.0/10 is carrier-grade NAT.
    let shared = a == 100 && (b & 0xc0) == 64;
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || shared
        || a == 0)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    !(ip.is_loopback() || ip.is_unspecified() || unique_local || link_local)
}

/// Join folded continuation lines (leading space or tab).
pub fn unfold_lines(body: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in body.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        match line.strip_prefix([' ', '\t']) {
            Some(rest) if !lines.is_empty() => {
                if let Some(last) = lines.last_mut() {
                    last.push_str(rest);
                }
            }
            _ => {
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
            }
        }
    }
    lines
}

/// Undo RFC 5545 TEXT escaping.
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// One content line split into name, parameters, and value.
struct Property<'a> {
    name: String,
    params: Vec<(String, &'a str)>,
    value: &'a str,
}

impl<'a> Property<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        // The value starts at the first ':' outside a quoted parameter.
        let mut in_quotes = false;
        let colon = line.char_indices().find_map(|(i, c)| match c {
            '"' => {
                in_quotes = !in_quotes;
                None
            }
            ':' if !in_quotes => Some(i),
            _ => None,
        })?;

        let (head, value) = (&line[..colon], &line[colon + 1..]);
        let mut parts = head.split(';');
        let name = parts.next()?.trim().to_ascii_uppercase();
        let params = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim_matches('"')))
            .collect();

        Some(Self {
            name,
            params,
            value,
        })
    }

    fn param(&self, key: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }
}

/// Normalize a DTSTART/DTEND value to ISO 8601.
///
/// `DATE` values become `YYYY-MM-DD`; UTC and `TZID` datetimes become UTC
/// RFC 3339; floating datetimes stay naive.
fn normalize_ical_date(value: &str, tzid: Option<&str>) -> Option<String> {
    let value = value.trim();

    if value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string());
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        return Some(naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    match tzid.and_then(|name| name.parse::<Tz>().ok()) {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => Some(naive.format("%Y-%m-%dT%H:%M:%S").to_string()),
    }
}

/// Classify a feed event by its summary.
pub fn classify_feed_event(summary: &str) -> FeedEventKind {
    let summary = summary.to_lowercase();
    KIND_RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| summary.contains(n)))
        .map(|(kind, _)| *kind)
        .unwrap_or(FeedEventKind::Other)
}

/// Course code such as `CSCE-120` or `CHEM 107`, normalized to `LETTERS DIGITS`.
///
/// Bracketed text (Canvas appends `[CSCE-120-501]`) is searched first.
pub fn extract_course_code(summary: &str) -> Option<String> {
    let bracketed = summary
        .split('[')
        .skip(1)
        .filter_map(|rest| rest.split(']').next());

    bracketed
        .chain(std::iter::once(summary))
        .find_map(find_course_code)
}

fn find_course_code(text: &str) -> Option<String> {
    let caps = COURSE_CODE.as_ref()?.captures(text)?;
    Some(format!("{} {}", &caps[1], &caps[2]))
}

/// Parse every `VEVENT` in a feed.
pub fn parse_feed(body: &str) -> Vec<FeedEvent> {
    let mut events = Vec::new();
    let mut current: Option<EventBuilder> = None;

    for line in unfold_lines(body) {
        let Some(prop) = Property::parse(&line) else {
            continue;
        };

        match (prop.name.as_str(), prop.value.trim()) {
            ("BEGIN", "VEVENT") => current = Some(EventBuilder::default()),
            ("END", "VEVENT") => {
                if let Some(builder) = current.take() {
                    events.push(builder.build());
                }
            }
            _ => {
                if let Some(builder) = current.as_mut() {
                    builder.apply(&prop);
                }
            }
        }
    }

    tracing::debug!(count = events.len(), "Parsed calendar feed");
    events
}

#[derive(Default)]
struct EventBuilder {
    summary: Option<String>,
    description: Option<String>,
    start: Option<String>,
    end: Option<String>,
    location: Option<String>,
    url: Option<String>,
}

impl EventBuilder {
    fn apply(&mut self, prop: &Property<'_>) {
        let text = || Some(unescape_text(prop.value)).filter(|s| !s.trim().is_empty());
        match prop.name.as_str() {
            "SUMMARY" => self.summary = text(),
            "DESCRIPTION" => self.description = text(),
            "LOCATION" => self.location = text(),
            "URL" => self.url = text(),
            "DTSTART" => self.start = normalize_ical_date(prop.value, prop.param("TZID")),
            "DTEND" => self.end = normalize_ical_date(prop.value, prop.param("TZID")),
            _ => {}
        }
    }

    fn build(self) -> FeedEvent {
        let title = self.summary.unwrap_or_else(|| "Untitled".to_string());
        FeedEvent {
            kind: classify_feed_event(&title),
            course_code: extract_course_code(&title),
            title,
            description: self.description,
            start: self.start,
            end: self.end,
            location: self.location,
            url: self.url,
        }
    }
}

/// Shift a UTC RFC 3339 instant to campus-local time so its date prefix is
/// the local calendar day. Other values pass through.
fn localize(value: &str, tz: Tz) -> String {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => dt
            .with_timezone(&tz)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        Err(_) => value.to_string(),
    }
}

/// Key dates for every typed (non-`other`) event.
pub fn to_key_dates(events: &[FeedEvent], tz: Tz) -> Vec<KeyDate> {
    events
        .iter()
        .filter(|e| e.kind != FeedEventKind::Other)
        .map(|e| KeyDate {
            date: e.start.as_deref().map(|s| localize(s, tz)).unwrap_or_default(),
            event: e.title.clone(),
            kind: e.kind.as_str().to_string(),
            note: match e.kind {
                FeedEventKind::Homework => e.description.clone(),
                FeedEventKind::Exam => e.location.clone(),
                _ => None,
            },
        })
        .collect()
}

/// Distinct course codes in first-seen order.
pub fn course_codes(events: &[FeedEvent]) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in events.iter().filter_map(|e| e.course_code.as_ref()) {
        if !codes.contains(code) {
            codes.push(code.clone());
        }
    }
    codes
}

/// Group typed events into one syllabus per course code.
pub fn group_by_course(events: &[FeedEvent], tz: Tz) -> Vec<NewSyllabus> {
    let mut by_course: BTreeMap<String, Vec<FeedEvent>> = BTreeMap::new();
    for event in events.iter().filter(|e| e.kind != FeedEventKind::Other) {
        let course = event
            .course_code
            .clone()
            .unwrap_or_else(|| UNSORTED_COURSE.to_string());
        by_course.entry(course).or_default().push(event.clone());
    }

    by_course
        .into_iter()
        .map(|(course, events)| NewSyllabus {
            course_id: course_id_for(&course),
            course_name: course,
            instructor: None,
            semester: Some(IMPORTED_SEMESTER.to_string()),
            key_dates: to_key_dates(&events, tz),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Instructure//Canvas\r\n\
BEGIN:VEVENT\r\n\
DTSTART:20251016T045900Z\r\n\
SUMMARY:HW 5: Linked Lists [CSCE-120-501]\r\n\
DESCRIPTION:Implement a doubly linked list\\, with tests.\\nSubmit on\r\n  Gradescope.\r\n\
URL:https://canvas.example.edu/courses/1/assignments/2\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
DTSTART;VALUE=DATE:20251020\r\n\
SUMMARY:Midterm Exam 2 [MATH 151]\r\n\
LOCATION:ZACH 350\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
DTSTART;TZID=America/Chicago:20251022T100000\r\n\
DTEND;TZID=America/Chicago:20251022T110000\r\n\
SUMMARY:Office hours\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_feed() {
        let events = parse_feed(FEED);
        assert_eq!(events.len(), 3);

        let hw = &events[0];
        assert_eq!(hw.title, "HW 5: Linked Lists [CSCE-120-501]");
        assert_eq!(hw.kind, FeedEventKind::Other);
        assert_eq!(hw.course_code.as_deref(), Some("CSCE 120"));
        assert_eq!(hw.start.as_deref(), Some("2025-10-16T04:59:00Z"));
        assert_eq!(
            hw.description.as_deref(),
            Some("Implement a doubly linked list, with tests.\nSubmit on Gradescope.")
        );

        let exam = &events[1];
        assert_eq!(exam.kind, FeedEventKind::Exam);
        assert_eq!(exam.course_code.as_deref(), Some("MATH 151"));
        assert_eq!(exam.start.as_deref(), Some("2025-10-20"));
        assert_eq!(exam.location.as_deref(), Some("ZACH 350"));

        let office = &events[2];
        assert_eq!(office.kind, FeedEventKind::Other);
        assert_eq!(office.start.as_deref(), Some("2025-10-22T15:00:00Z"));
        assert_eq!(office.end.as_deref(), Some("2025-10-22T16:00:00Z"));
        assert_eq!(office.course_code, None);
    }

    #[test]
    fn test_classify_feed_event_order() {
        assert_eq!(classify_feed_event("[HW] Chapter 3"), FeedEventKind::Homework);
        assert_eq!(classify_feed_event("Assignment 2"), FeedEventKind::Homework);
        assert_eq!(classify_feed_event("Final Exam"), FeedEventKind::Exam);
        assert_eq!(classify_feed_event("Homework before exam"), FeedEventKind::Homework);
        assert_eq!(classify_feed_event("Pop Quizzes"), FeedEventKind::Quiz);
        assert_eq!(classify_feed_event("Laboratory Safety"), FeedEventKind::Lab);
        assert_eq!(classify_feed_event("Group Presentation"), FeedEventKind::Project);
        assert_eq!(classify_feed_event("Office hours"), FeedEventKind::Other);
    }

    #[test]
    fn test_extract_course_code() {
        assert_eq!(extract_course_code("Quiz [CHEM 107]").as_deref(), Some("CHEM 107"));
        assert_eq!(extract_course_code("CSCE-120 Lab").as_deref(), Some("CSCE 120"));
        assert_eq!(extract_course_code("ECEN - 214 review").as_deref(), Some("ECEN 214"));
        assert_eq!(extract_course_code("HW 3 [CSCE-120-501]").as_deref(), Some("CSCE 120"));
        assert_eq!(extract_course_code("Read chapter 4"), None);
        assert_eq!(extract_course_code("A 12"), None);
    }

    #[test]
    fn test_unescape_and_unfold() {
        assert_eq!(unescape_text(r"a\, b\; c\\d\Ne"), "a, b; c\\d\ne");
        assert_eq!(
            unfold_lines("SUMMARY:Long\r\n  title\r\nURL:x\n"),
            vec!["SUMMARY:Long title".to_string(), "URL:x".to_string()]
        );
    }

    #[test]
    fn test_key_dates_and_grouping() {
        let tz = chrono_tz::America::Chicago;
        let mut events = parse_feed(FEED);
        events[0].kind = classify_feed_event("[HW] 5");

        let key_dates = to_key_dates(&events, tz);
        assert_eq!(key_dates.len(), 2);
        // 04:59 UTC on the 16th is 23:59 on the 15th in Chicago.
        assert_eq!(key_dates[0].date, "2025-10-15T23:59:00-05:00");
        assert_eq!(key_dates[0].kind, "homework");
        assert_eq!(key_dates[1].note.as_deref(), Some("ZACH 350"));

        let grouped = group_by_course(&events, tz);
        let names: Vec<&str> = grouped.iter().map(|s| s.course_name.as_str()).collect();
        assert_eq!(names, vec!["CSCE 120", "MATH 151"]);
        assert_eq!(grouped[0].course_id, "csce_120");
        assert_eq!(grouped[0].semester.as_deref(), Some(IMPORTED_SEMESTER));

        assert_eq!(course_codes(&events), vec!["CSCE 120", "MATH 151"]);
    }

    #[test]
    fn test_extract_course_code_whitespace_and_embedded() {
        assert_eq!(extract_course_code("CSCE\t120 review").as_deref(), Some("CSCE 120"));
        assert_eq!(extract_course_code("iOS101 intro").as_deref(), Some("OS 101"));
        assert_eq!(extract_course_code("xCSCE 120").as_deref(), Some("CSCE 120"));
        assert_eq!(extract_course_code("MATH151").as_deref(), Some("MATH 151"));
    }

    #[test]
    fn test_validate_feed_url() {
        let feed = "https://canvas.example.edu/feeds/calendars/user_abc.ics";
        assert!(validate_feed_url(feed, false).is_ok());
        assert!(validate_feed_url("webcal://canvas.example.edu/feeds/calendars/u.ics", false).is_err());
        assert!(validate_feed_url("https://canvas.example.edu/api/v1/courses", false).is_err());
        assert!(validate_feed_url("not a url", false).is_err());
        assert!(validate_feed_url("", false).is_err());
    }

    #[test]
    fn test_validate_feed_url_rejects_private_hosts() {
        for url in [
            "http://169.254.169.254/feeds/calendars/latest.ics",
            "http://127.0.0.1:5000/feeds/calendars/user.ics",
            "http://localhost/feeds/calendars/user.ics",
            "http://api.localhost/feeds/calendars/user.ics",
            "http://10.0.0.7/feeds/calendars/user.ics",
            "http://192.168.1.1/feeds/calendars/user.ics",
            "http://100.64.0.1/feeds/calendars/user.ics",
            "http://0.0.0.0/feeds/calendars/user.ics",
            "http://[::1]/feeds/calendars/user.ics",
            "http://[fd00::1]/feeds/calendars/user.ics",
            "http://[fe80::1]/feeds/calendars/user.ics",
            "http://[::ffff:127.0.0.1]/feeds/calendars/user.ics",
        ] {
            let err = validate_feed_url(url, false).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{} should be rejected", url);
        }

        assert!(validate_feed_url("http://8.8.8.8/feeds/calendars/user.ics", false).is_ok());
        assert!(validate_feed_url("http://127.0.0.1:5000/feeds/calendars/user.ics", true).is_ok());
        assert!(validate_feed_url("http://127.0.0.1:5000/api/health", true).is_err());
    }
}
