//! Event history, thumbnail URL, and snapshot handlers.

use chrono::{DateTime, Utc};
use tabled::Tabled;

use wyzely_core::{Coordinator, Event, EventQuery, ImageFetcher, PlaceholderImage};

use crate::cli::{EventsArgs, GlobalOpts, SnapshotArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Event ID")]
    id: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "Image")]
    image: String,
}

fn event_time(event: &Event) -> String {
    DateTime::<Utc>::from_timestamp_millis(event.event_ts)
        .filter(|_| event.event_ts >= 0)
        .map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn event_row(e: &Event) -> EventRow {
    EventRow {
        time: event_time(e),
        id: util::or_dash(e.event_id.as_deref()),
        files: e.files.len(),
        image: e.image_url().map(str::to_owned).unwrap_or_default(),
    }
}

pub async fn list(
    coordinator: &Coordinator,
    args: EventsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let device = coordinator.require_device(&args.mac)?;
    let mut query = EventQuery::for_device(device.mac.clone()).count(args.count);
    if let Some(minutes) = args.window {
        let begin = Utc::now() - chrono::Duration::minutes(i64::from(minutes));
        query = query.window(Some(begin.timestamp_millis()), None);
    }

    let events = coordinator.list_events(&query).await?;
    let out = output::render_list(
        &global.output,
        &events,
        event_row,
        |e| e.event_id.clone().unwrap_or_else(|| e.event_ts.to_string()),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn image_url(
    coordinator: &Coordinator,
    mac: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    coordinator.require_device(mac)?;
    let url = match coordinator.image_url(mac).await? {
        Some(url) => Some(url),
        None => coordinator.latest_event_image(mac).await,
    };
    let Some(url) = url else {
        return Err(CliError::NotFound {
            resource_type: "image".into(),
            identifier: mac.into(),
            list_command: format!("events {mac}"),
        });
    };
    output::print_output(&url, global.quiet);
    Ok(())
}

pub async fn snapshot(
    coordinator: &Coordinator,
    args: SnapshotArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut fetcher = ImageFetcher::new(coordinator.clone());
    if let Some(ref path) = args.placeholder {
        fetcher = fetcher.with_placeholder(PlaceholderImage::load(&[path]));
    }

    let Some(image) = fetcher.image(&args.mac).await? else {
        let reason = fetcher
            .last_error(&args.mac)
            .unwrap_or_else(|| "no image".into());
        return Err(CliError::NotFound {
            resource_type: "image".into(),
            identifier: format!("{} ({reason})", args.mac),
            list_command: format!("events {}", args.mac),
        });
    };

    std::fs::write(&args.file, &image.bytes)?;
    if let Some(reason) = fetcher.last_error(&args.mac) {
        tracing::warn!(mac = %args.mac, %reason, "wrote a fallback image");
    }
    output::print_output(
        &format!(
            "Wrote {} bytes ({}) to {}",
            image.bytes.len(),
            image.content_type,
            args.file.display()
        ),
        global.quiet,
    );
    Ok(())
}
