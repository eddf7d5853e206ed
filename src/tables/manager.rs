//! Process-wide table cache: tables are immutable once loaded and never
//! evicted, so lookups pay disk I/O once per distinct path.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use hashbrown::HashMap;

use super::{TableB, TableD};
use crate::Error;

static TABLE_B_CACHE: OnceLock<RwLock<HashMap<PathBuf, Arc<TableB>>>> = OnceLock::new();
static TABLE_D_CACHE: OnceLock<RwLock<HashMap<PathBuf, Arc<TableD>>>> = OnceLock::new();

fn compose_table_path(
    base: &Path,
    master_table_number: u32,
    centre_number: u32,
    sub_centre_number: u32,
    version_number: u32,
    file_name: &str,
) -> PathBuf {
    base.join(master_table_number.to_string())
        .join(centre_number.to_string())
        .join(sub_centre_number.to_string())
        .join(version_number.to_string())
        .join(file_name)
}

pub(crate) fn get_table_b(
    base: &Path,
    master_table_number: u32,
    centre_number: u32,
    sub_centre_number: u32,
    version_number: u32,
) -> Result<Arc<TableB>, Error> {
    let path = compose_table_path(
        base,
        master_table_number,
        centre_number,
        sub_centre_number,
        version_number,
        "TableB.csv",
    );
    let cache = TABLE_B_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Some(t) = cache.read().unwrap().get(&path) {
        return Ok(t.clone());
    }
    let mut write = cache.write().unwrap();
    if let Some(t) = write.get(&path) {
        return Ok(t.clone());
    }
    let entries = super::load_table_b(&path)?;
    let table = Arc::new(TableB {
        path: path.clone(),
        entries,
    });
    write.insert(path, table.clone());
    Ok(table)
}

pub(crate) fn get_table_d(
    base: &Path,
    master_table_number: u32,
    centre_number: u32,
    sub_centre_number: u32,
    version_number: u32,
) -> Result<Arc<TableD>, Error> {
    let path = compose_table_path(
        base,
        master_table_number,
        centre_number,
        sub_centre_number,
        version_number,
        "TableD.csv",
    );
    let cache = TABLE_D_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Some(t) = cache.read().unwrap().get(&path) {
        return Ok(t.clone());
    }
    let mut write = cache.write().unwrap();
    if let Some(t) = write.get(&path) {
        return Ok(t.clone());
    }
    let entries = super::load_table_d(&path)?;
    let table = Arc::new(TableD {
        path: path.clone(),
        entries,
    });
    write.insert(path, table.clone());
    Ok(table)
}
