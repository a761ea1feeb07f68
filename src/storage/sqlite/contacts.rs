//! `SQLite` contact repository.
//!
//! Contacts live in `contacts`; phones and emails are child rows keyed by
//! `(contact_id, position)` so display order survives a round trip.

use super::connection::{
    acquire_lock, db_error, from_db_timestamp, open_database, open_in_memory, to_db_timestamp,
};
use crate::models::{Contact, ContactGroup, ContactId, LabeledValue};
use crate::storage::traits::ContactRepository;
use crate::{Error, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::instrument;

const SELECT_CONTACT: &str = "SELECT id, given_name, family_name, organization, birthday, image,
        symbol, contact_group, created_at, updated_at
 FROM contacts";

const SELECT_PHONES: &str =
    "SELECT label, value FROM contact_phones WHERE contact_id = ?1 ORDER BY position";

const SELECT_EMAILS: &str =
    "SELECT label, value FROM contact_emails WHERE contact_id = ?1 ORDER BY position";

/// `SQLite`-backed contact repository.
pub struct SqliteContactRepository {
    conn: Mutex<Connection>,
}

impl SqliteContactRepository {
    /// Opens (or creates) the contact tables in the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open_database(path.as_ref(), "open_contacts_db")?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.initialize_schema()?;
        Ok(repo)
    }

    /// Creates an in-memory repository (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory("open_contacts_db_memory")?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.initialize_schema()?;
        Ok(repo)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                given_name TEXT NOT NULL DEFAULT '',
                family_name TEXT NOT NULL DEFAULT '',
                organization TEXT,
                birthday TEXT,
                image BLOB,
                symbol TEXT,
                contact_group TEXT NOT NULL DEFAULT 'other',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS contact_phones (
                contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                label TEXT NOT NULL DEFAULT '',
                value TEXT NOT NULL,
                PRIMARY KEY (contact_id, position)
            );

            CREATE TABLE IF NOT EXISTS contact_emails (
                contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                label TEXT NOT NULL DEFAULT '',
                value TEXT NOT NULL,
                PRIMARY KEY (contact_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(family_name, given_name);
            ",
        )
        .map_err(db_error("initialize_contacts_schema"))?;
        Ok(())
    }
}

/// Raw `contacts` row before child rows are attached.
struct ContactRow {
    id: String,
    given_name: String,
    family_name: String,
    organization: Option<String>,
    birthday: Option<String>,
    image: Option<Vec<u8>>,
    symbol: Option<String>,
    group: String,
    created_at: i64,
    updated_at: i64,
}

impl ContactRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            given_name: row.get(1)?,
            family_name: row.get(2)?,
            organization: row.get(3)?,
            birthday: row.get(4)?,
            image: row.get(5)?,
            symbol: row.get(6)?,
            group: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_contact(self, conn: &Connection) -> Result<Contact> {
        let birthday = match self.birthday.as_deref() {
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
                Error::OperationFailed {
                    operation: "decode_birthday".to_string(),
                    cause: format!("{}: {e}", self.id),
                }
            })?),
            None => None,
        };
        let phones = load_labeled(conn, SELECT_PHONES, &self.id)?;
        let emails = load_labeled(conn, SELECT_EMAILS, &self.id)?;

        Ok(Contact {
            id: ContactId::new(self.id),
            given_name: self.given_name,
            family_name: self.family_name,
            organization: self.organization,
            phones,
            emails,
            birthday,
            image: self.image,
            symbol: self.symbol,
            group: ContactGroup::parse(&self.group).unwrap_or_default(),
            created_at: from_db_timestamp(self.created_at),
            updated_at: from_db_timestamp(self.updated_at),
        })
    }
}

fn load_labeled(conn: &Connection, sql: &str, contact_id: &str) -> Result<Vec<LabeledValue>> {
    let mut stmt = conn.prepare_cached(sql).map_err(db_error("prepare_labeled"))?;
    let rows = stmt
        .query_map(params![contact_id], |row| {
            Ok(LabeledValue {
                label: row.get(0)?,
                value: row.get(1)?,
            })
        })
        .map_err(db_error("query_labeled"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_error("read_labeled"))
}

fn load_contact(conn: &Connection, id: &str) -> Result<Option<Contact>> {
    let row = conn
        .query_row(
            &format!("{SELECT_CONTACT} WHERE id = ?1"),
            params![id],
            ContactRow::from_row,
        )
        .optional()
        .map_err(db_error("get_contact"))?;
    row.map(|r| r.into_contact(conn)).transpose()
}

fn contact_exists(conn: &Connection, id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM contacts WHERE id = ?1",
        params![id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(db_error("contact_exists"))
}

/// Replaces phone and email rows for a contact.
fn write_children(tx: &Transaction<'_>, contact: &Contact) -> Result<()> {
    let id = contact.id.as_str();
    tx.execute("DELETE FROM contact_phones WHERE contact_id = ?1", params![id])
        .map_err(db_error("clear_phones"))?;
    tx.execute("DELETE FROM contact_emails WHERE contact_id = ?1", params![id])
        .map_err(db_error("clear_emails"))?;

    for (position, phone) in contact.phones.iter().enumerate() {
        tx.execute(
            "INSERT INTO contact_phones (contact_id, position, label, value)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, i64::try_from(position).unwrap_or(i64::MAX), phone.label, phone.value],
        )
        .map_err(db_error("insert_phone"))?;
    }
    for (position, email) in contact.emails.iter().enumerate() {
        tx.execute(
            "INSERT INTO contact_emails (contact_id, position, label, value)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, i64::try_from(position).unwrap_or(i64::MAX), email.label, email.value],
        )
        .map_err(db_error("insert_email"))?;
    }
    Ok(())
}

fn birthday_text(contact: &Contact) -> Option<String> {
    contact.birthday.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Updates the contact row. Returns the number of rows changed.
fn write_contact(tx: &Transaction<'_>, contact: &Contact, now: u64) -> Result<usize> {
    tx.execute(
        "UPDATE contacts SET given_name = ?2, family_name = ?3, organization = ?4,
                birthday = ?5, image = ?6, symbol = ?7, contact_group = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            contact.id.as_str(),
            contact.given_name,
            contact.family_name,
            contact.organization,
            birthday_text(contact),
            contact.image,
            contact.symbol,
            contact.group.as_str(),
            to_db_timestamp(now),
        ],
    )
    .map_err(db_error("update_contact"))
}

impl ContactRepository for SqliteContactRepository {
    #[instrument(skip(self, contact), fields(contact_id = %contact.id))]
    fn insert(&self, contact: &Contact) -> Result<()> {
        let mut conn = acquire_lock(&self.conn);
        if contact_exists(&conn, contact.id.as_str())? {
            return Err(Error::InvalidInput(format!(
                "contact '{}' already exists",
                contact.id
            )));
        }

        let now = crate::current_timestamp();
        let created_at = if contact.created_at == 0 { now } else { contact.created_at };
        let updated_at = if contact.updated_at == 0 { created_at } else { contact.updated_at };

        let tx = conn.transaction().map_err(db_error("begin_insert_contact"))?;
        tx.execute(
            "INSERT INTO contacts (id, given_name, family_name, organization, birthday, image,
                                   symbol, contact_group, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                contact.id.as_str(),
                contact.given_name,
                contact.family_name,
                contact.organization,
                birthday_text(contact),
                contact.image,
                contact.symbol,
                contact.group.as_str(),
                to_db_timestamp(created_at),
                to_db_timestamp(updated_at),
            ],
        )
        .map_err(db_error("insert_contact"))?;
        write_children(&tx, contact)?;
        tx.commit().map_err(db_error("commit_insert_contact"))?;

        tracing::debug!("Inserted contact");
        Ok(())
    }

    fn get(&self, id: &ContactId) -> Result<Option<Contact>> {
        let conn = acquire_lock(&self.conn);
        load_contact(&conn, id.as_str())
    }

    fn list(&self) -> Result<Vec<Contact>> {
        let conn = acquire_lock(&self.conn);
        let rows = {
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_CONTACT} ORDER BY family_name COLLATE NOCASE,
                                      given_name COLLATE NOCASE, id"
                ))
                .map_err(db_error("prepare_list_contacts"))?;
            let rows = stmt
                .query_map([], ContactRow::from_row)
                .map_err(db_error("list_contacts"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("read_contacts"))?
        };
        rows.into_iter().map(|r| r.into_contact(&conn)).collect()
    }

    #[instrument(skip(self, contact), fields(contact_id = %contact.id))]
    fn update(&self, contact: &Contact) -> Result<bool> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(db_error("begin_update_contact"))?;
        let changed = write_contact(&tx, contact, crate::current_timestamp())?;
        if changed == 0 {
            return Ok(false);
        }
        write_children(&tx, contact)?;
        tx.commit().map_err(db_error("commit_update_contact"))?;
        Ok(true)
    }

    #[instrument(skip(self), fields(contact_id = %id))]
    fn delete(&self, id: &ContactId) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let rows = conn
            .execute("DELETE FROM contacts WHERE id = ?1", params![id.as_str()])
            .map_err(db_error("delete_contact"))?;
        Ok(rows > 0)
    }

    fn count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .map_err(db_error("count_contacts"))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    #[instrument(skip(self, primary), fields(primary_id = %primary.id, secondary_id = %secondary_id))]
    fn apply_merge(&self, primary: &Contact, secondary_id: &ContactId) -> Result<()> {
        if &primary.id == secondary_id {
            return Err(Error::InvalidInput(format!(
                "cannot merge contact '{secondary_id}' with itself"
            )));
        }

        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(db_error("begin_merge"))?;

        if !contact_exists(&tx, secondary_id.as_str())? {
            return Err(Error::contact_not_found(secondary_id));
        }
        if write_contact(&tx, primary, crate::current_timestamp())? == 0 {
            return Err(Error::contact_not_found(&primary.id));
        }
        write_children(&tx, primary)?;
        tx.execute(
            "DELETE FROM contacts WHERE id = ?1",
            params![secondary_id.as_str()],
        )
        .map_err(db_error("delete_merged_contact"))?;

        tx.commit().map_err(db_error("commit_merge"))?;
        tracing::debug!("Merge applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anna() -> Contact {
        Contact::new("Anna", "Larsson")
            .with_id("a")
            .with_organization("Acme AB")
            .with_phone("mobile", "070-1234567")
            .with_phone("work", "08-5551234")
            .with_email("home", "anna@x.com")
            .with_birthday(NaiveDate::from_ymd_opt(1990, 4, 12).unwrap())
            .with_image(vec![0xff, 0xd8])
    }

    #[test]
    fn test_insert_and_get() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        let contact = anna();
        repo.insert(&contact).unwrap();

        let loaded = repo.get(&contact.id).unwrap().unwrap();
        assert_eq!(loaded.given_name, "Anna");
        assert_eq!(loaded.phones, contact.phones);
        assert_eq!(loaded.emails, contact.emails);
        assert_eq!(loaded.birthday, contact.birthday);
        assert_eq!(loaded.image, contact.image);
        assert_eq!(loaded.organization.as_deref(), Some("Acme AB"));
    }

    #[test]
    fn test_insert_duplicate_id_rejected() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        repo.insert(&anna()).unwrap();
        let err = repo.insert(&anna()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_get_missing() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        assert!(repo.get(&ContactId::new("nope")).unwrap().is_none());
    }

    #[test]
    fn test_list_ordered_by_name() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        repo.insert(&Contact::new("Erik", "Holm").with_id("e")).unwrap();
        repo.insert(&Contact::new("Anna", "Larsson").with_id("a")).unwrap();
        repo.insert(&Contact::new("Bo", "Holm").with_id("b")).unwrap();

        let names: Vec<String> = repo
            .list()
            .unwrap()
            .iter()
            .map(Contact::display_name)
            .collect();
        assert_eq!(names, vec!["Bo Holm", "Erik Holm", "Anna Larsson"]);
    }

    #[test]
    fn test_update_replaces_children() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        let mut contact = anna();
        repo.insert(&contact).unwrap();

        contact.phones.truncate(1);
        contact.emails.push(LabeledValue::new("work", "anna@acme.se"));
        assert!(repo.update(&contact).unwrap());

        let loaded = repo.get(&contact.id).unwrap().unwrap();
        assert_eq!(loaded.phones.len(), 1);
        assert_eq!(loaded.emails.len(), 2);

        let ghost = Contact::new("No", "One").with_id("ghost");
        assert!(!repo.update(&ghost).unwrap());
    }

    #[test]
    fn test_delete_cascades() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        let contact = anna();
        repo.insert(&contact).unwrap();
        assert!(repo.delete(&contact.id).unwrap());
        assert!(!repo.delete(&contact.id).unwrap());

        let conn = acquire_lock(&repo.conn);
        let phones: i64 = conn
            .query_row("SELECT COUNT(*) FROM contact_phones", [], |row| row.get(0))
            .unwrap();
        assert_eq!(phones, 0);
    }

    #[test]
    fn test_apply_merge_is_atomic() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        let primary = anna();
        let secondary = Contact::new("Anna", "Larsson").with_id("b");
        repo.insert(&primary).unwrap();
        repo.insert(&secondary).unwrap();

        let merged = primary.clone().with_email("work", "anna@acme.se");
        repo.apply_merge(&merged, &secondary.id).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.get(&primary.id).unwrap().unwrap().emails.len(), 2);
    }

    #[test]
    fn test_apply_merge_missing_secondary_changes_nothing() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        let primary = anna();
        repo.insert(&primary).unwrap();

        let merged = primary.clone().with_email("work", "anna@acme.se");
        let err = repo
            .apply_merge(&merged, &ContactId::new("gone"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(repo.get(&primary.id).unwrap().unwrap().emails.len(), 1);
    }

    #[test]
    fn test_apply_merge_missing_primary_keeps_secondary() {
        let repo = SqliteContactRepository::in_memory().unwrap();
        let secondary = Contact::new("Anna", "Larsson").with_id("b");
        repo.insert(&secondary).unwrap();

        let err = repo.apply_merge(&anna(), &secondary.id).unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.get(&secondary.id).unwrap().is_some());
    }

    #[test]
    fn test_reopen_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("contacts.db");
        {
            let repo = SqliteContactRepository::new(&path).unwrap();
            repo.insert(&anna()).unwrap();
        }
        let repo = SqliteContactRepository::new(&path).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
    }
}
