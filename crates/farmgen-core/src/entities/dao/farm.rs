use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A row in the `farms` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Farm {
    pub id: Uuid,
    pub name: String,
    /// Operator-assigned identifier, unique across farms.
    pub external_farm_id: String,
    /// Name of the CSV file the farm was created from, if any.
    pub import_file_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
