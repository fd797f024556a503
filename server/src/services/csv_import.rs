//! Alumni list import. Each line is `email,name`; matching buyers are moved into
//! the alumni group, unknown addresses are created there.

use serde::Serialize;
use tracing::{info, warn};

use super::auth::normalize_email;
use crate::models::{NewBuyer, ALUMNI_GROUP};
use crate::store::Store;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

enum Outcome {
    Created,
    Updated,
    Skipped,
}

fn is_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    let mut fields = lower.split(',').map(str::trim);
    matches!(
        (fields.next(), fields.next(), fields.next()),
        (Some("email" | "e-mail"), Some("name"), None)
    )
}

fn parse_line(line_no: usize, line: &str) -> Result<(String, String), String> {
    if line.contains(';') && !line.contains(',') {
        return Err(format!(
            "Zeile {line_no}: Semikolon als Trennzeichen erkannt, bitte Komma verwenden."
        ));
    }
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [email, name] = fields.as_slice() else {
        return Err(format!(
            "Zeile {line_no}: Erwartet 2 Spalten (E-Mail, Name), gefunden {}.",
            fields.len()
        ));
    };
    let email = normalize_email(email)
        .ok_or_else(|| format!("Zeile {line_no}: Ungültige E-Mail-Adresse \"{email}\"."))?;
    if name.is_empty() {
        return Err(format!("Zeile {line_no}: Name fehlt."));
    }
    Ok((email, name.to_string()))
}

async fn upsert(
    store: &dyn Store,
    group_id: uuid::Uuid,
    email: String,
    name: String,
) -> Result<Outcome, AppError> {
    match store.find_buyer_by_email(&email).await? {
        None => {
            store
                .insert_buyer(NewBuyer {
                    email,
                    name: Some(name),
                    group_id,
                    verified: false,
                })
                .await?;
            Ok(Outcome::Created)
        }
        Some(buyer) if buyer.group_id == group_id && buyer.name.as_deref() == Some(&name) => {
            Ok(Outcome::Skipped)
        }
        Some(buyer) => {
            store
                .update_buyer_group_and_name(buyer.id, group_id, &name)
                .await?;
            Ok(Outcome::Updated)
        }
    }
}

/// Imports the uploaded text. Bad lines are reported and skipped; the rest of the
/// file is still processed.
pub async fn import_alumni(
    store: &dyn Store,
    text: &str,
    staff: &str,
) -> Result<ImportReport, AppError> {
    let group = store
        .find_buyer_group_by_name(ALUMNI_GROUP)
        .await?
        .ok_or_else(|| {
            AppError::InternalServerError(format!("Käufergruppe {ALUMNI_GROUP} fehlt."))
        })?;

    let mut report = ImportReport::default();
    let mut first = true;
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if std::mem::take(&mut first) && is_header(line) {
            continue;
        }
        let line_no = index + 1;

        let (email, name) = match parse_line(line_no, line) {
            Ok(parsed) => parsed,
            Err(message) => {
                report.errors.push(message);
                continue;
            }
        };
        match upsert(store, group.id, email, name).await {
            Ok(Outcome::Created) => report.created += 1,
            Ok(Outcome::Updated) => report.updated += 1,
            Ok(Outcome::Skipped) => report.skipped += 1,
            Err(err) => {
                warn!(line = line_no, error = %err, "Alumni import line failed");
                report.errors.push(format!("Zeile {line_no}: {}", err.public_message()));
            }
        }
    }

    info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        errors = report.errors.len(),
        staff = %staff,
        "Alumni import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PUBLIC_GROUP;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_header_is_skipped_and_rows_created() {
        let store = MemoryStore::new();
        let csv = "E-Mail,Name\nanna@schule.de,Anna\n\nben@schule.de, Ben \n";
        let report = import_alumni(&store, csv, "orga").await.unwrap();
        assert_eq!(report.created, 2);
        assert!(report.errors.is_empty());

        let ben = store
            .find_buyer_by_email("ben@schule.de")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ben.name.as_deref(), Some("Ben"));
    }

    #[tokio::test]
    async fn test_reimport_is_skipped() {
        let store = MemoryStore::new();
        import_alumni(&store, "a@x.de,Anna", "orga").await.unwrap();
        let report = import_alumni(&store, "a@x.de,Anna", "orga").await.unwrap();
        assert_eq!(
            report,
            ImportReport {
                skipped: 1,
                ..ImportReport::default()
            }
        );
    }

    #[tokio::test]
    async fn test_public_buyer_is_moved_to_alumni() {
        let store = MemoryStore::new();
        let public = store
            .find_buyer_group_by_name(PUBLIC_GROUP)
            .await
            .unwrap()
            .unwrap();
        store
            .insert_buyer(NewBuyer {
                email: "c@x.de".into(),
                name: None,
                group_id: public.id,
                verified: true,
            })
            .await
            .unwrap();

        let report = import_alumni(&store, "C@X.de,Clara", "orga").await.unwrap();
        assert_eq!(report.updated, 1);
        let clara = store.find_buyer_by_email("c@x.de").await.unwrap().unwrap();
        assert_ne!(clara.group_id, public.id);
        assert!(clara.verified);
    }

    #[tokio::test]
    async fn test_semicolon_line_reports_error() {
        let store = MemoryStore::new();
        let report = import_alumni(&store, "a@x.de;Anna\nb@x.de,Ben", "orga").await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(
            report.errors,
            vec!["Zeile 1: Semikolon als Trennzeichen erkannt, bitte Komma verwenden.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_bad_rows_are_reported_by_line() {
        let store = MemoryStore::new();
        let csv = "email,name\nkeine-adresse,X\nd@x.de,\ne@x.de,E,extra";
        let report = import_alumni(&store, csv, "orga").await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[0].starts_with("Zeile 2:"));
        assert!(report.errors[1].contains("Name fehlt"));
        assert!(report.errors[2].contains("gefunden 3"));
    }
}
