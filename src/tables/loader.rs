//! Flat-file CSV loaders for Table B and Table D.
//!
//! The corpus's own tables ship as plain comma-separated files with `#`
//! comment lines, so a hand-rolled split is used here rather than pulling in
//! a CSV crate for a handful of fixed-width columns.

use std::path::Path;

use hashbrown::HashMap;

use super::{unit_of, Bentry, Dentry, DescriptorId};
use crate::Error;

fn read_lines(path: &Path) -> Result<Vec<String>, Error> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::to_owned)
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .collect())
}

/// Table B row layout: id,name,unit,scale,refval,nbits,crex_unit,crex_scale,crex_nchars
fn record_to_bentry(fields: &[&str]) -> Result<(DescriptorId, Bentry), Error> {
    if fields.len() < 9 {
        return Err(Error::parse("malformed Table B record", 0));
    }
    let id = DescriptorId(
        fields[0]
            .trim()
            .parse()
            .map_err(|_| Error::parse("bad descriptor id", 0))?,
    );
    let unit_string = fields[2].trim().to_string();
    let crex_unit_string = fields[6].trim().to_string();
    let bentry = Bentry {
        name: fields[1].trim().to_string(),
        unit: unit_of(&unit_string),
        unit_string,
        scale: fields[3].trim().parse().unwrap_or(0),
        refval: fields[4].trim().parse().unwrap_or(0),
        nbits: fields[5].trim().parse().unwrap_or(0),
        crex_scale: fields[7].trim().parse().unwrap_or(0),
        crex_nchars: fields[8].trim().parse().unwrap_or(0),
        crex_unit: unit_of(&crex_unit_string),
        crex_unit_string,
    };
    Ok((id, bentry))
}

/// Table D row layout: id,name,comma-joined member ids (third field).
fn record_to_dentry(fields: &[&str]) -> Result<(DescriptorId, Dentry), Error> {
    if fields.len() < 3 {
        return Err(Error::parse("malformed Table D record", 0));
    }
    let id = DescriptorId(
        fields[0]
            .trim()
            .parse()
            .map_err(|_| Error::parse("bad descriptor id", 0))?,
    );
    let members = fields[2]
        .split(',')
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(|m| m.parse::<u32>().map(DescriptorId).map_err(|_| Error::parse("bad member id", 0)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((
        id,
        Dentry {
            name: fields[1].trim().to_string(),
            members,
        },
    ))
}

pub fn load_table_b(path: &Path) -> Result<HashMap<DescriptorId, Bentry>, Error> {
    let mut entries = HashMap::new();
    for line in read_lines(path)? {
        let fields: Vec<&str> = line.split(',').collect();
        let (id, entry) = record_to_bentry(&fields)?;
        entries.insert(id, entry);
    }
    Ok(entries)
}

pub fn load_table_d(path: &Path) -> Result<HashMap<DescriptorId, Dentry>, Error> {
    let mut entries = HashMap::new();
    for line in read_lines(path)? {
        let fields: Vec<&str> = line.splitn(3, ',').collect();
        let (id, entry) = record_to_dentry(&fields)?;
        entries.insert(id, entry);
    }
    Ok(entries)
}
