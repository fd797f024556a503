use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SaleWindow;
use crate::models::{SystemSettings, ALUMNI_GROUP};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleStatus {
    pub open: bool,
    pub message: Option<String>,
    pub opens_at: Option<DateTime<Utc>>,
}

/// Whether a buyer of `group` may buy right now. Alumni get their own start date;
/// everyone else, including anonymous visitors, uses the public one.
pub fn sale_status(
    settings: &SystemSettings,
    window: &SaleWindow,
    group: Option<&str>,
    now: DateTime<Utc>,
) -> SaleStatus {
    if !settings.sales_enabled {
        return SaleStatus {
            open: false,
            message: Some("Der Ticketverkauf ist derzeit deaktiviert.".to_string()),
            opens_at: None,
        };
    }

    let start = match group {
        Some(ALUMNI_GROUP) => window.alumni_start,
        _ => window.public_start,
    };
    match start {
        Some(start) if now < start => SaleStatus {
            open: false,
            message: Some(format!(
                "Der Ticketverkauf startet am {}.",
                start.format("%d.%m.%Y um %H:%M Uhr (UTC)")
            )),
            opens_at: Some(start),
        },
        _ => SaleStatus {
            open: true,
            message: None,
            opens_at: None,
        },
    }
}
