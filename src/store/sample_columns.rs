//! Declarative column set for the `samples` table.
//!
//! Adding columns is always safe. Dropping columns destroys data, so it needs
//! two separate confirmations from a [`SchemaApproval`].

use std::io::{BufRead, Write};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::util::quote_ident;
use super::{FIXED_SAMPLE_COLUMNS, StateStore, StoreError, map_sql_error};

static COLUMN_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(\s*\d+\s*(,\s*\d+\s*)?\))?[A-Za-z0-9_ ]*$")
        .expect("column type regex must compile")
});

/// One configured sample column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidColumnName(self.name.clone()));
        }
        if !COLUMN_TYPE.is_match(self.sql_type.trim()) {
            return Err(StoreError::InvalidColumnType {
                name: self.name.clone(),
                sql_type: self.sql_type.clone(),
            });
        }
        Ok(())
    }
}

/// Difference between the configured columns and the current table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaPlan {
    pub to_add: Vec<ColumnSpec>,
    pub to_remove: Vec<String>,
}

impl SchemaPlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// What `sync_schema` actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSyncOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Removals that were planned but not confirmed.
    pub removal_declined: Vec<String>,
}

/// Operator gate for destructive column removal.
///
/// Both questions must be answered `true`; the second is asked only after
/// the first is accepted.
pub trait SchemaApproval {
    /// "Are you sure you want to delete these columns?"
    fn confirm_removal(&mut self, columns: &[String]) -> bool;
    /// "This deletes all data in these columns. Really?"
    fn confirm_data_loss(&mut self, columns: &[String]) -> bool;
}

/// Never approves removal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyRemoval;

impl SchemaApproval for DenyRemoval {
    fn confirm_removal(&mut self, _columns: &[String]) -> bool {
        false
    }

    fn confirm_data_loss(&mut self, _columns: &[String]) -> bool {
        false
    }
}

/// Non-interactive approval from two independent command line flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagApproval {
    pub allow_column_removal: bool,
    pub confirm_data_loss: bool,
}

impl SchemaApproval for FlagApproval {
    fn confirm_removal(&mut self, columns: &[String]) -> bool {
        if !self.allow_column_removal {
            warn!(
                "Column removal not allowed; pass --allow-column-removal to drop: {}",
                columns.join(", ")
            );
        }
        self.allow_column_removal
    }

    fn confirm_data_loss(&mut self, columns: &[String]) -> bool {
        if !self.confirm_data_loss {
            warn!(
                "Data loss not confirmed; pass --confirm-data-loss to drop: {}",
                columns.join(", ")
            );
        }
        self.confirm_data_loss
    }
}

/// Terminal prompts: type `yes`, then `really`.
pub struct InteractiveApproval<R, W> {
    input: R,
    output: W,
}

impl InteractiveApproval<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> InteractiveApproval<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str, expected: &str) -> bool {
        if write!(self.output, "{prompt}").and_then(|_| self.output.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(_) => answer.trim() == expected,
            Err(_) => false,
        }
    }
}

impl<R: BufRead, W: Write> SchemaApproval for InteractiveApproval<R, W> {
    fn confirm_removal(&mut self, columns: &[String]) -> bool {
        let _ = writeln!(
            self.output,
            "Database config would remove columns: {}",
            columns.join(", ")
        );
        self.ask(
            "Are you sure you want to delete these columns? Type 'yes' to confirm: ",
            "yes",
        )
    }

    fn confirm_data_loss(&mut self, _columns: &[String]) -> bool {
        self.ask(
            "Are you really sure? This will delete all data in these columns. Type 'really' to confirm: ",
            "really",
        )
    }
}

impl StateStore {
    /// Compare the configured column set with the table without changing it.
    pub fn plan_schema(&self, wanted: &[ColumnSpec]) -> Result<SchemaPlan, StoreError> {
        for column in wanted {
            column.validate()?;
        }
        let existing = self.sample_columns()?;
        let to_add = wanted
            .iter()
            .filter(|column| !FIXED_SAMPLE_COLUMNS.contains(&column.name.as_str()))
            .filter(|column| !existing.contains(&column.name))
            .fold(Vec::<ColumnSpec>::new(), |mut acc, column| {
                if !acc.iter().any(|seen| seen.name == column.name) {
                    acc.push(column.clone());
                }
                acc
            });
        let to_remove = existing
            .into_iter()
            .filter(|name| !FIXED_SAMPLE_COLUMNS.contains(&name.as_str()))
            .filter(|name| !wanted.iter().any(|column| &column.name == name))
            .collect();
        Ok(SchemaPlan { to_add, to_remove })
    }

    /// Bring the `samples` columns in line with `wanted`.
    ///
    /// New columns are always added. Columns missing from `wanted` are dropped
    /// only if `approval` accepts both confirmations; otherwise they are
    /// reported in `removal_declined` and the table keeps them.
    pub fn sync_schema(
        &mut self,
        wanted: &[ColumnSpec],
        approval: &mut dyn SchemaApproval,
    ) -> Result<SchemaSyncOutcome, StoreError> {
        let plan = self.plan_schema(wanted)?;
        let mut outcome = SchemaSyncOutcome::default();

        if !plan.to_add.is_empty() {
            let tx = self.connection.transaction().map_err(map_sql_error)?;
            for column in &plan.to_add {
                tx.execute(
                    &format!(
                        "ALTER TABLE samples ADD COLUMN {} {}",
                        quote_ident(&column.name),
                        column.sql_type.trim()
                    ),
                    [],
                )
                .map_err(map_sql_error)?;
            }
            tx.commit().map_err(map_sql_error)?;
            outcome.added = plan.to_add.iter().map(|c| c.name.clone()).collect();
            info!("Added sample columns: {}", outcome.added.join(", "));
        }

        if !plan.to_remove.is_empty() {
            let approved = approval.confirm_removal(&plan.to_remove)
                && approval.confirm_data_loss(&plan.to_remove);
            if approved {
                let tx = self.connection.transaction().map_err(map_sql_error)?;
                for name in &plan.to_remove {
                    tx.execute(
                        &format!("ALTER TABLE samples DROP COLUMN {}", quote_ident(name)),
                        [],
                    )
                    .map_err(map_sql_error)?;
                }
                tx.commit().map_err(map_sql_error)?;
                outcome.removed = plan.to_remove;
                info!("Removed sample columns: {}", outcome.removed.join(", "));
            } else {
                warn!(
                    "Kept sample columns missing from config: {}",
                    plan.to_remove.join(", ")
                );
                outcome.removal_declined = plan.to_remove;
            }
        }

        if outcome.added.is_empty() && outcome.removed.is_empty() {
            info!("No changes to sample columns");
        }
        Ok(outcome)
    }
}
