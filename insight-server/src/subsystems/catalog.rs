//! Catalog subsystem: user and photo listings reshaped from CMS session events
//!
//! Each listing issues exactly one CMS query and reshapes the nodes:
//! - user names are deduplicated in order of first appearance
//! - photo URLs keep CMS order, filtered by exact `user_name` match
//!
//! A record whose `eventData` string cannot be decoded is logged and excluded;
//! it never fails the batch.

use insight_core::config::CmsConfig;
use insight_core::{CmsError, EventData, EventQuery, SessionEvent, SessionEventSource};

fn skip_malformed(event: &SessionEvent, reason: &str) {
    tracing::warn!(
        event = event.label(),
        step = event.step_name().unwrap_or("<unknown>"),
        reason = %reason,
        "Skipping event with unparseable eventData"
    );
}

/// Deduplicated, non-empty user names in order of first appearance.
pub fn collect_user_names(events: &[SessionEvent]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for event in events {
        let data = event.data();
        if let EventData::Malformed(reason) = &data {
            skip_malformed(event, reason);
            continue;
        }
        if let Some(name) = data.user_name() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }

    names
}

/// Photo URLs of events matching `user_filter`, in CMS order.
///
/// `None` or an empty filter keeps every well-formed event. Matching is exact
/// and case-sensitive.
pub fn collect_photo_urls(events: &[SessionEvent], user_filter: Option<&str>) -> Vec<String> {
    let filter = user_filter.filter(|f| !f.is_empty());

    events
        .iter()
        .filter(|event| {
            let data = event.data();
            if let EventData::Malformed(reason) = &data {
                skip_malformed(event, reason);
                return false;
            }
            match filter {
                None => true,
                Some(wanted) => data.user_name() == Some(wanted),
            }
        })
        .filter_map(|event| event.photo_url().map(str::to_string))
        .collect()
}

pub async fn list_users(
    source: &dyn SessionEventSource,
    config: &CmsConfig,
) -> Result<Vec<String>, CmsError> {
    let events = source
        .fetch_events(EventQuery::user_names(config.users_page_size))
        .await?;
    let names = collect_user_names(&events);
    tracing::debug!(
        events = events.len(),
        users = names.len(),
        source = source.name(),
        "Listed users"
    );
    Ok(names)
}

pub async fn list_photos(
    source: &dyn SessionEventSource,
    config: &CmsConfig,
    user_filter: Option<&str>,
) -> Result<Vec<String>, CmsError> {
    let events = source
        .fetch_events(EventQuery::photos(config.photos_page_size))
        .await?;
    let urls = collect_photo_urls(&events, user_filter);
    tracing::info!(
        user = user_filter.unwrap_or("<all>"),
        events = events.len(),
        photos = urls.len(),
        photo_urls = ?urls,
        "Listed photos"
    );
    Ok(urls)
}
