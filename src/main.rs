use std::sync::Arc;

use roomchat::config::HostConfig;
use roomchat::panel::{ChatPanel, PanelUpdate};
use roomchat::render;
use roomchat::store::postgres::PgMessageStore;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = HostConfig::from_env().expect("invalid configuration");

    let pool = roomchat::db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");
    let store = Arc::new(PgMessageStore::new(pool));

    let mut panel = ChatPanel::mount(store, config.props.clone(), config.options).await;
    let mut drawn = draw(&mut panel, 0, config.terminal_width);

    loop {
        tokio::select! {
            Some(update) = panel.next_update() => {
                match &update {
                    PanelUpdate::Appended { .. } => {
                        drawn = draw(&mut panel, drawn, config.terminal_width);
                    }
                    PanelUpdate::Notice(notice) => {
                        println!("{}", render::render_notice(notice));
                    }
                }
                if update.ends_subscription() {
                    tracing::error!("live query lost; exiting");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
        }
    }

    panel.unmount().await;
}

/// Print rows past `drawn`, then report layout as settled.
fn draw(panel: &mut ChatPanel, drawn: usize, width: usize) -> usize {
    let rows = panel.rows();
    for row in &rows[drawn..] {
        println!("{}", render::render_line(row, width));
    }
    if let Some(command) = panel.content_settled(rows.len()) {
        tracing::debug!(?command, "scrolled to newest message");
    }
    rows.len()
}
