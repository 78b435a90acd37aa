use anyhow::Result;
use std::sync::{Arc, Mutex};

use super::utils::{controller_for, open_store};
use crate::config::Config;
use crate::lockout::LockStatus;

/// Show lock status for one riddle or all configured ones
pub fn status(config: &Config, riddle: Option<u32>) -> Result<()> {
    let riddle_ids: Vec<u32> = match riddle {
        Some(id) => vec![id],
        None => config.riddles.iter().map(|r| r.id).collect(),
    };

    if riddle_ids.is_empty() {
        anyhow::bail!("No riddles configured. Add [[riddles]] entries or pass --riddle.");
    }

    let store = Arc::new(Mutex::new(open_store(config)?));

    println!("\n=== Riddle Lock Status ===\n");

    for riddle_id in riddle_ids {
        let mut controller = controller_for(config, riddle_id, Box::new(store.clone()));
        controller.check_lock()?;
        let status = controller.status();

        println!("{} ({}):", config.riddle_name(riddle_id), riddle_id);
        println!("  Status: {}", describe_lock(&status));
        println!(
            "  Last answer: {}",
            match controller.was_correct()? {
                Some(true) => "correct",
                Some(false) => "wrong",
                None => "none",
            }
        );
        if status.time_over {
            println!("  Last lock: ran out");
        }
        println!();
    }

    Ok(())
}

/// Remove the lock on a riddle
pub fn clear(config: &Config, riddle_id: u32) -> Result<()> {
    let store = open_store(config)?;
    let mut controller = controller_for(config, riddle_id, Box::new(store));

    let was_locked = controller.check_lock()?;
    controller.clear_lock()?;

    if was_locked {
        tracing::info!("Lock on riddle {} cleared by hand", riddle_id);
        println!("✓ Cleared lock on {}", config.riddle_name(riddle_id));
    } else {
        println!("{} was not locked", config.riddle_name(riddle_id));
    }

    Ok(())
}

fn describe_lock(status: &LockStatus) -> String {
    match (status.locked, status.unlock_at) {
        (true, Some(unlock_at)) => format!(
            "🔒 LOCKED ({} left, until {})",
            status.remaining_display(),
            unlock_at.with_timezone(&chrono::Local).format("%H:%M:%S")
        ),
        (true, None) => format!("🔒 LOCKED ({} left)", status.remaining_display()),
        (false, _) => "✓ Unlocked".to_string(),
    }
}
