// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transactional persistence of device records.
//!
//! Each record field lives in its own table keyed by UDID. A save is a
//! single write transaction covering all fields, so readers observe
//! either the prior record or the fully new one. Writing an empty field
//! deletes its stored entry rather than storing an empty value; fields
//! absent on load read back as empty strings.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};

use crate::device::DeviceRecord;
use crate::error::{Error, Result};

const SERIAL_TABLE: TableDefinition<&str, &str> = TableDefinition::new("device_serial");
const COMPUTER_NAME_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("device_computer_name");
const IDENTITY_UUID_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("device_mdm_identity_keychain_uuid");
const PROFILE_ID_TABLE: TableDefinition<&str, &str> = TableDefinition::new("device_mdm_profile_id");

/// Device record store backed by a redb database.
///
/// Cheap to clone and safe to share across a fleet; individual
/// transactions are serialized by the database.
#[derive(Clone)]
pub struct DeviceStore {
    db: Arc<Database>,
}

impl DeviceStore {
    /// Open or create a device store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())
            .map_err(|e| Error::storage(format!("open device store: {e}")))?;

        // Ensure all tables exist so later read transactions never see
        // a missing table.
        let txn = db
            .begin_write()
            .map_err(|e| Error::storage(format!("initialize device store: {e}")))?;
        for table in [
            SERIAL_TABLE,
            COMPUTER_NAME_TABLE,
            IDENTITY_UUID_TABLE,
            PROFILE_ID_TABLE,
        ] {
            txn.open_table(table)
                .map_err(|e| Error::storage(format!("create table: {e}")))?;
        }
        txn.commit()
            .map_err(|e| Error::storage(format!("initialize device store: {e}")))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Save a device record in one transaction.
    ///
    /// Empty fields delete their stored entries.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the record has no UDID;
    /// [`Error::Storage`] on transaction failure.
    pub fn save(&self, record: &DeviceRecord) -> Result<()> {
        if !record.is_valid() {
            return Err(Error::validation("invalid device record: empty UDID"));
        }

        let txn = self
            .db
            .begin_write()
            .map_err(|e| Error::storage(format!("begin save transaction: {e}")))?;
        put_or_delete(&txn, SERIAL_TABLE, &record.udid, &record.serial)?;
        put_or_delete(
            &txn,
            COMPUTER_NAME_TABLE,
            &record.udid,
            &record.computer_name,
        )?;
        put_or_delete(
            &txn,
            IDENTITY_UUID_TABLE,
            &record.udid,
            &record.mdm_identity_keychain_uuid,
        )?;
        put_or_delete(
            &txn,
            PROFILE_ID_TABLE,
            &record.udid,
            &record.mdm_profile_identifier,
        )?;
        txn.commit()
            .map_err(|e| Error::storage(format!("commit save transaction: {e}")))?;

        tracing::debug!(udid = %record.udid, "saved device record");
        Ok(())
    }

    /// Load the record stored under `udid`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no serial is stored for the UDID.
    pub fn load(&self, udid: &str) -> Result<DeviceRecord> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| Error::storage(format!("begin load transaction: {e}")))?;

        let serial = read_field(&txn, SERIAL_TABLE, udid)?;
        if serial.is_empty() {
            return Err(Error::not_found(format!("device {udid} not found")));
        }

        Ok(DeviceRecord {
            udid: udid.to_owned(),
            serial,
            computer_name: read_field(&txn, COMPUTER_NAME_TABLE, udid)?,
            mdm_identity_keychain_uuid: read_field(&txn, IDENTITY_UUID_TABLE, udid)?,
            mdm_profile_identifier: read_field(&txn, PROFILE_ID_TABLE, udid)?,
        })
    }

    /// List the UDIDs of all stored devices.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the store holds zero devices — an empty
    /// store is an explicit condition, not an empty successful result.
    pub fn list(&self) -> Result<Vec<String>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| Error::storage(format!("begin list transaction: {e}")))?;
        let table = txn
            .open_table(SERIAL_TABLE)
            .map_err(|e| Error::storage(format!("open serial table: {e}")))?;

        let mut udids = Vec::new();
        let iter = table
            .iter()
            .map_err(|e| Error::storage(format!("iterate serial table: {e}")))?;
        for entry in iter {
            let (key, _) = entry.map_err(|e| Error::storage(format!("read serial entry: {e}")))?;
            udids.push(key.value().to_owned());
        }

        if udids.is_empty() {
            return Err(Error::not_found("no devices in store"));
        }
        Ok(udids)
    }
}

impl std::fmt::Debug for DeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStore").finish_non_exhaustive()
    }
}

fn put_or_delete(
    txn: &WriteTransaction,
    table: TableDefinition<&str, &str>,
    udid: &str,
    value: &str,
) -> Result<()> {
    let mut table = txn
        .open_table(table)
        .map_err(|e| Error::storage(format!("open table: {e}")))?;
    if value.is_empty() {
        table
            .remove(udid)
            .map_err(|e| Error::storage(format!("delete field: {e}")))?;
    } else {
        table
            .insert(udid, value)
            .map_err(|e| Error::storage(format!("write field: {e}")))?;
    }
    Ok(())
}

fn read_field(
    txn: &ReadTransaction,
    table: TableDefinition<&str, &str>,
    udid: &str,
) -> Result<String> {
    let table = txn
        .open_table(table)
        .map_err(|e| Error::storage(format!("open table: {e}")))?;
    let value = table
        .get(udid)
        .map_err(|e| Error::storage(format!("read field: {e}")))?;
    Ok(value.map(|v| v.value().to_owned()).unwrap_or_default())
}
