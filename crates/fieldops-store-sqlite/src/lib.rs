#![forbid(unsafe_code)]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fieldops_domain::{
    format_date, format_rfc3339, now_utc, parse_date, parse_rfc3339, FollowUp, FollowUpId,
    FollowUpStatus, InventoryItem, InventoryItemId, Invoice, InvoiceId, Job, JobId, NewFollowUp,
    NewInventoryItem, NewInvoice, NewJob, NewRevenueEntry, RevenueEntryId,
};
use fieldops_store::JobStore;
use rusqlite::{params, Connection, OptionalExtension};
use time::Date;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  customer_name TEXT NOT NULL,
  job_type TEXT NOT NULL,
  materials_json TEXT NOT NULL DEFAULT '[]',
  labor_hours REAL NOT NULL DEFAULT 0.0,
  status TEXT NOT NULL DEFAULT 'completed',
  transcript TEXT NOT NULL DEFAULT '',
  confidence_score REAL NOT NULL DEFAULT 0.0,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  item_name TEXT NOT NULL UNIQUE,
  quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
  unit TEXT NOT NULL DEFAULT 'piece',
  unit_cost REAL NOT NULL DEFAULT 10.0,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS invoices (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  job_id INTEGER NOT NULL,
  labor_cost REAL NOT NULL DEFAULT 0.0,
  materials_cost REAL NOT NULL DEFAULT 0.0,
  total_amount REAL NOT NULL DEFAULT 0.0,
  created_at TEXT NOT NULL,
  FOREIGN KEY (job_id) REFERENCES jobs(id)
);

CREATE TABLE IF NOT EXISTS follow_ups (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  job_id INTEGER NOT NULL,
  customer_name TEXT NOT NULL,
  scheduled_date TEXT NOT NULL,
  reason TEXT NOT NULL DEFAULT '',
  status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','completed','cancelled')),
  created_at TEXT NOT NULL,
  FOREIGN KEY (job_id) REFERENCES jobs(id)
);

CREATE TABLE IF NOT EXISTS revenue_entries (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  date TEXT NOT NULL,
  amount REAL NOT NULL DEFAULT 0.0,
  source TEXT NOT NULL DEFAULT 'invoice',
  job_id INTEGER,
  created_at TEXT NOT NULL,
  FOREIGN KEY (job_id) REFERENCES jobs(id)
);

CREATE INDEX IF NOT EXISTS idx_jobs_customer ON jobs(customer_name);
CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);
CREATE INDEX IF NOT EXISTS idx_invoices_job ON invoices(job_id);
CREATE INDEX IF NOT EXISTS idx_follow_ups_customer ON follow_ups(customer_name);
CREATE INDEX IF NOT EXISTS idx_follow_ups_date ON follow_ups(scheduled_date);
CREATE INDEX IF NOT EXISTS idx_revenue_date ON revenue_entries(date);
";

/// Starting catalogue of common field-service materials. Item names are
/// lower-cased on insert so they share the handlers' natural keyspace.
pub const SEED_INVENTORY: &[(&str, i64, &str, f64)] = &[
    // Plumbing
    ("Copper Pipe (1/2 inch)", 30, "piece", 12.50),
    ("Copper Pipe (3/4 inch)", 20, "piece", 15.00),
    ("PVC Pipe (2 inch)", 25, "piece", 8.00),
    ("Elbow Joint", 50, "piece", 3.50),
    ("Pipe Sealant", 15, "tube", 6.00),
    ("Faucet Handle", 10, "piece", 18.00),
    ("Water Heater Element", 5, "piece", 45.00),
    ("Drain Snake", 3, "piece", 25.00),
    // Electrical
    ("Electrical Outlet", 40, "piece", 5.00),
    ("Light Switch", 30, "piece", 4.50),
    ("Breaker Panel", 3, "piece", 150.00),
    ("10-Gauge Wire", 200, "feet", 1.20),
    ("12-Gauge Wire", 300, "feet", 0.85),
    ("Junction Box", 20, "piece", 7.00),
    ("Fluorescent Light Bulb", 25, "piece", 8.50),
    ("LED Bulb", 40, "piece", 6.00),
    // HVAC
    ("Air Filter", 15, "piece", 22.00),
    ("Refrigerant (R-410A)", 10, "pound", 35.00),
    ("Thermostat", 5, "piece", 65.00),
    ("HVAC Filter", 12, "piece", 18.00),
    // Painting
    ("Interior Paint (White)", 10, "gallon", 35.00),
    ("Exterior Paint", 8, "gallon", 45.00),
    ("Paint Roller", 12, "piece", 8.00),
    ("Wood Stain", 6, "can", 28.00),
    // Carpentry
    ("Pine Lumber Board", 20, "board", 12.00),
    ("Plywood Sheet", 10, "sheet", 35.00),
    ("Wood Screws (Box)", 15, "box", 9.00),
    ("Bracket", 30, "piece", 4.00),
    ("Drywall Sheet", 12, "sheet", 14.00),
    // General
    ("Silicone Caulk", 20, "tube", 7.50),
    ("Teflon Tape", 25, "roll", 2.50),
    ("WD-40", 8, "can", 6.00),
];

pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    /// Open or create a `SQLite` database and configure local pragmas.
    ///
    /// # Errors
    /// Returns an error if opening the database or applying pragmas fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;
        configure(&conn)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database, mainly for tests.
    ///
    /// # Errors
    /// Returns an error if opening the database or applying pragmas fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("failed to open in-memory sqlite database")?;
        configure(&conn)?;
        Ok(Self { conn })
    }

    /// Load the seed catalogue, skipping names that already exist.
    /// Returns `(added, skipped)`.
    ///
    /// # Errors
    /// Returns an error when an insert fails.
    pub fn seed_inventory(&self) -> Result<(usize, usize)> {
        let mut added = 0;
        let mut skipped = 0;
        for (name, quantity, unit, unit_cost) in SEED_INVENTORY {
            let key = normalize_item_name(name);
            if self.find_inventory_item(&key)?.is_some() {
                skipped += 1;
                continue;
            }
            self.insert_inventory_item(&NewInventoryItem {
                item_name: key,
                quantity: *quantity,
                unit: (*unit).to_string(),
                unit_cost: *unit_cost,
            })?;
            added += 1;
        }
        Ok((added, skipped))
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .context("failed to configure sqlite pragmas")?;
    Ok(())
}

fn normalize_item_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl JobStore for SqliteJobStore {
    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("failed to apply schema")?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, format_rfc3339(now_utc())?],
            )
            .context("failed to record migration")?;
        Ok(())
    }

    fn begin(&self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE;")
            .context("failed to begin transaction")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT;")
            .context("failed to commit transaction")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK;")
            .context("failed to roll back transaction")?;
        Ok(())
    }

    fn insert_job(&self, job: &NewJob) -> Result<JobId> {
        self.conn
            .execute(
                "INSERT INTO jobs(
                    customer_name, job_type, materials_json, labor_hours,
                    status, transcript, confidence_score, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    job.customer_name,
                    job.job_type,
                    serde_json::to_string(&job.materials_used)?,
                    job.labor_hours,
                    job.status,
                    job.transcript,
                    job.confidence_score,
                    format_rfc3339(now_utc())?,
                ],
            )
            .context("failed to insert job")?;
        Ok(JobId(self.conn.last_insert_rowid()))
    }

    fn find_inventory_item(&self, item_name: &str) -> Result<Option<InventoryItem>> {
        let key = normalize_item_name(item_name);
        let row = self
            .conn
            .query_row(
                "SELECT id, item_name, quantity, unit, unit_cost, updated_at
                 FROM inventory WHERE item_name = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .context("failed to query inventory item")?;

        match row {
            None => Ok(None),
            Some((id, item_name, quantity, unit, unit_cost, updated_at)) => {
                Ok(Some(InventoryItem {
                    id: InventoryItemId(id),
                    item_name,
                    quantity,
                    unit,
                    unit_cost,
                    updated_at: parse_rfc3339(&updated_at)?,
                }))
            }
        }
    }

    fn insert_inventory_item(&self, item: &NewInventoryItem) -> Result<InventoryItemId> {
        self.conn
            .execute(
                "INSERT INTO inventory(item_name, quantity, unit, unit_cost, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    normalize_item_name(&item.item_name),
                    item.quantity,
                    item.unit,
                    item.unit_cost,
                    format_rfc3339(now_utc())?,
                ],
            )
            .context("failed to insert inventory item")?;
        Ok(InventoryItemId(self.conn.last_insert_rowid()))
    }

    fn set_inventory_quantity(&self, id: InventoryItemId, quantity: i64) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE inventory SET quantity = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.0, quantity, format_rfc3339(now_utc())?],
            )
            .context("failed to update inventory quantity")?;
        if changed == 0 {
            return Err(anyhow!("inventory item {id} not found"));
        }
        Ok(())
    }

    fn list_inventory(&self) -> Result<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, item_name, quantity, unit, unit_cost, updated_at
             FROM inventory ORDER BY item_name ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let updated_at: String = row.get(5)?;
            out.push(InventoryItem {
                id: InventoryItemId(row.get(0)?),
                item_name: row.get(1)?,
                quantity: row.get(2)?,
                unit: row.get(3)?,
                unit_cost: row.get(4)?,
                updated_at: parse_rfc3339(&updated_at)?,
            });
        }
        Ok(out)
    }

    fn insert_invoice(&self, invoice: &NewInvoice) -> Result<InvoiceId> {
        self.conn
            .execute(
                "INSERT INTO invoices(job_id, labor_cost, materials_cost, total_amount, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    invoice.job_id.0,
                    invoice.labor_cost,
                    invoice.materials_cost,
                    invoice.total_amount,
                    format_rfc3339(now_utc())?,
                ],
            )
            .context("failed to insert invoice")?;
        Ok(InvoiceId(self.conn.last_insert_rowid()))
    }

    fn insert_follow_up(&self, follow_up: &NewFollowUp) -> Result<FollowUpId> {
        self.conn
            .execute(
                "INSERT INTO follow_ups(
                    job_id, customer_name, scheduled_date, reason, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    follow_up.job_id.0,
                    follow_up.customer_name,
                    format_date(follow_up.scheduled_date)?,
                    follow_up.reason,
                    follow_up.status.as_str(),
                    format_rfc3339(now_utc())?,
                ],
            )
            .context("failed to insert follow-up")?;
        Ok(FollowUpId(self.conn.last_insert_rowid()))
    }

    fn insert_revenue_entry(&self, entry: &NewRevenueEntry) -> Result<RevenueEntryId> {
        self.conn
            .execute(
                "INSERT INTO revenue_entries(date, amount, source, job_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_date(entry.date)?,
                    entry.amount,
                    entry.source,
                    entry.job_id.0,
                    format_rfc3339(now_utc())?,
                ],
            )
            .context("failed to insert revenue entry")?;
        Ok(RevenueEntryId(self.conn.last_insert_rowid()))
    }

    fn get_invoice_for_job(&self, job_id: JobId) -> Result<Option<Invoice>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, job_id, labor_cost, materials_cost, total_amount, created_at
                 FROM invoices WHERE job_id = ?1",
                params![job_id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .context("failed to query invoice")?;

        match row {
            None => Ok(None),
            Some((id, job_id, labor_cost, materials_cost, total_amount, created_at)) => {
                Ok(Some(Invoice {
                    id: InvoiceId(id),
                    job_id: JobId(job_id),
                    labor_cost,
                    materials_cost,
                    total_amount,
                    created_at: parse_rfc3339(&created_at)?,
                }))
            }
        }
    }

    fn recent_jobs(&self, limit: u32) -> Result<Vec<Job>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, customer_name, job_type, materials_json, labor_hours,
                    status, transcript, confidence_score, created_at
             FROM jobs ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![i64::from(limit)])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let materials_json: String = row.get(3)?;
            let created_at: String = row.get(8)?;
            out.push(Job {
                id: JobId(row.get(0)?),
                customer_name: row.get(1)?,
                job_type: row.get(2)?,
                materials_used: serde_json::from_str(&materials_json)
                    .context("invalid materials snapshot JSON")?,
                labor_hours: row.get(4)?,
                status: row.get(5)?,
                transcript: row.get(6)?,
                confidence_score: row.get(7)?,
                created_at: parse_rfc3339(&created_at)?,
            });
        }
        Ok(out)
    }

    fn jobs_logged_on(&self, date: Date) -> Result<i64> {
        // created_at is RFC 3339, so its first ten characters are the date.
        let count = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE substr(created_at, 1, 10) = ?1",
                params![format_date(date)?],
                |row| row.get(0),
            )
            .context("failed to count jobs for date")?;
        Ok(count)
    }

    fn revenue_on(&self, date: Date) -> Result<f64> {
        let total = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(amount), 0.0) FROM revenue_entries WHERE date = ?1",
                params![format_date(date)?],
                |row| row.get(0),
            )
            .context("failed to sum revenue for date")?;
        Ok(total)
    }

    fn revenue_since(&self, date: Date) -> Result<f64> {
        let total = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(amount), 0.0) FROM revenue_entries WHERE date >= ?1",
                params![format_date(date)?],
                |row| row.get(0),
            )
            .context("failed to sum revenue since date")?;
        Ok(total)
    }

    fn low_stock_below(&self, threshold: i64) -> Result<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, item_name, quantity, unit, unit_cost, updated_at
             FROM inventory WHERE quantity <= ?1 ORDER BY quantity ASC, item_name ASC",
        )?;
        let mut rows = stmt.query(params![threshold])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let updated_at: String = row.get(5)?;
            out.push(InventoryItem {
                id: InventoryItemId(row.get(0)?),
                item_name: row.get(1)?,
                quantity: row.get(2)?,
                unit: row.get(3)?,
                unit_cost: row.get(4)?,
                updated_at: parse_rfc3339(&updated_at)?,
            });
        }
        Ok(out)
    }

    fn pending_follow_ups_through(&self, date: Date) -> Result<Vec<FollowUp>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, customer_name, scheduled_date, reason, status, created_at
             FROM follow_ups
             WHERE status = 'pending' AND scheduled_date <= ?1
             ORDER BY scheduled_date ASC, id ASC",
        )?;
        let mut rows = stmt.query(params![format_date(date)?])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let scheduled_date: String = row.get(3)?;
            let status: String = row.get(5)?;
            let created_at: String = row.get(6)?;
            out.push(FollowUp {
                id: FollowUpId(row.get(0)?),
                job_id: JobId(row.get(1)?),
                customer_name: row.get(2)?,
                scheduled_date: parse_date(&scheduled_date)?,
                reason: row.get(4)?,
                status: FollowUpStatus::parse(&status)
                    .ok_or_else(|| anyhow!("unknown follow-up status '{status}'"))?,
                created_at: parse_rfc3339(&created_at)?,
            });
        }
        Ok(out)
    }
}
