//! `scrapejob notifications` – show recent failure/recovery notifications.

use anyhow::Result;
use scrapejob_core::store::JobStore;

pub async fn run_notifications(store: &JobStore, limit: u32) -> Result<()> {
    let notes = store.list_notifications(limit).await?;
    if notes.is_empty() {
        println!("No notifications.");
        return Ok(());
    }
    for n in notes {
        let marker = if n.read { " " } else { "*" };
        println!(
            "{marker} {:<6} {:<24} {}",
            n.id, n.notification.kind, n.notification.title
        );
        println!("         {}", n.notification.content);
    }
    Ok(())
}
