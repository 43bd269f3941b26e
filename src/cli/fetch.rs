use std::time::Duration;

use tabled::Table;

use crate::{cli::spinner, error, spotify::SpotifyClient, success, warning};

/// Fetches metadata for `url` and prints it.
///
/// # Arguments
///
/// * `url` - Any supported Spotify link, URI or bare playlist id
/// * `batch` - Sleep `delay` between listing pages and report the page count
/// * `delay` - Pause between pages in batch mode
/// * `timeout` - Overall deadline, zero for none
/// * `table` - Print a track table instead of JSON
pub async fn fetch(url: &str, batch: bool, delay: Duration, timeout: Duration, table: bool) {
    let client = match SpotifyClient::from_env() {
        Ok(c) => c,
        Err(e) => error!("Failed to create Spotify client: {}", e),
    };

    let pb = spinner("Fetching metadata from Spotify...");
    let result = client.fetch_metadata(url, batch, delay, timeout).await;
    pb.finish_and_clear();

    let payload = match result {
        Ok(p) => p,
        Err(e) => error!("Failed to fetch metadata: {}", e),
    };

    if table {
        let rows = payload.table_rows();
        if rows.is_empty() {
            warning!("No tracks to display for {}", payload.kind());
            return;
        }
        let count = rows.len();
        println!("{}", Table::new(rows));
        success!("Fetched {} tracks ({})", count, payload.kind());
        return;
    }

    match serde_json::to_string_pretty(&payload) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("Failed to serialize metadata: {}", e),
    }
}
