//! `threadwise windows <channel>`: list stored summary windows.

use threadwise_config::AppConfig;

const PREVIEW_CHARS: usize = 120;

pub async fn run(channel_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = super::open_store(&config).await?;

    let windows = store.list_by_channel(channel_id).await?;
    if windows.is_empty() {
        println!("  No summary windows for channel '{channel_id}'.");
        return Ok(());
    }

    println!("🧵 Summary windows for '{channel_id}' ({} stored in {})", windows.len(), store.name());
    println!();
    for window in &windows {
        let mut preview: String = window.summary.chars().take(PREVIEW_CHARS).collect();
        if window.summary.chars().count() > PREVIEW_CHARS {
            preview.push('…');
        }
        println!(
            "  #{:<3} updated {}  last message {}  files {}",
            window.window_number,
            window.updated_at.format("%Y-%m-%d %H:%M"),
            window.last_message_id.as_deref().unwrap_or("-"),
            window.file_descriptors.len()
        );
        println!("       {}", preview.replace('\n', " "));
    }

    Ok(())
}
