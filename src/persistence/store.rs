use crate::mobile::Serial;
use crate::persistence::serialize::{read_mobile, SaveError};
use crate::telemetry::logging;
use crate::world::state::World;
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};

const DIGEST_LEN: usize = 20;

/// On-disk mobile saves: one `<serial>.sav` per mobile under `<root>/saves`,
/// each record followed by a sha1 trailer over the payload. Overwriting an
/// existing save first copies it to `.bak`, and a save that fails its digest
/// or parse falls back to that backup.
pub struct SaveStore {
    dir: PathBuf,
}

/// What a full scan of the save directory found.
#[derive(Debug, Default)]
pub struct SaveValidationReport {
    pub save_files: usize,
    pub parsed: usize,
    pub recovered: usize,
    pub errors: Vec<String>,
    pub missing_dir: bool,
}

impl SaveStore {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("saves"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save_path(&self, serial: Serial) -> PathBuf {
        self.dir.join(format!("{:08x}.sav", serial.0))
    }

    fn backup_path(&self, serial: Serial) -> PathBuf {
        self.dir.join(format!("{:08x}.bak", serial.0))
    }

    /// Write a record payload with its digest trailer, backing up any
    /// previous save first.
    pub fn save_raw(&self, serial: Serial, payload: &[u8]) -> Result<(), String> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| format!("save directory create failed: {}", err))?;
        let path = self.save_path(serial);
        if path.exists() {
            fs::copy(&path, self.backup_path(serial))
                .map_err(|err| format!("backup of {} failed: {}", path.display(), err))?;
        }
        let mut bytes = Vec::with_capacity(payload.len() + DIGEST_LEN);
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(Sha1::digest(payload).as_slice());
        fs::write(&path, &bytes)
            .map_err(|err| format!("write of {} failed: {}", path.display(), err))
    }

    /// Read a verified record payload. A primary save that fails its digest
    /// or is unreadable falls back to the `.bak` copy.
    pub fn load_raw(&self, serial: Serial) -> Result<Vec<u8>, String> {
        let primary = self.save_path(serial);
        match read_verified(&primary) {
            Ok(payload) => Ok(payload),
            Err(primary_err) => {
                let backup = self.backup_path(serial);
                if !backup.exists() {
                    return Err(primary_err);
                }
                logging::log_save(&format!(
                    "save {} fell back to backup: {}",
                    serial, primary_err
                ));
                read_verified(&backup)
                    .map_err(|backup_err| format!("{}; backup also failed: {}", primary_err, backup_err))
            }
        }
    }

    pub fn save_mobile(&self, world: &World, serial: Serial) -> Result<(), String> {
        let payload = world
            .snapshot_mobile(serial)
            .ok_or_else(|| format!("mobile {} is not saveable", serial))?;
        self.save_raw(serial, &payload)?;
        logging::log_save(&format!("saved mobile {} ({} bytes)", serial, payload.len()));
        Ok(())
    }

    pub fn load_mobile(&self, world: &mut World, serial: Serial) -> Result<Serial, String> {
        let payload = self.load_raw(serial)?;
        world
            .restore_mobile(&payload)
            .map_err(|err: SaveError| format!("record for {} is invalid: {}", serial, err))
    }

    /// Restore every save file into the world. Unreadable files are skipped
    /// with an error entry; the rest of the directory still loads.
    pub fn load_all(&self, world: &mut World) -> SaveValidationReport {
        let mut report = SaveValidationReport::default();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => {
                report.missing_dir = true;
                return report;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("sav"))
            .collect();
        paths.sort();
        for path in paths {
            report.save_files += 1;
            let loaded = read_verified(&path)
                .or_else(|primary_err| {
                    let backup = path.with_extension("bak");
                    if backup.exists() {
                        read_verified(&backup).map(|payload| {
                            report.recovered += 1;
                            payload
                        })
                    } else {
                        Err(primary_err)
                    }
                })
                .and_then(|payload| {
                    world
                        .restore_mobile(&payload)
                        .map_err(|err| format!("{}: {}", path.display(), err))
                });
            match loaded {
                Ok(_) => report.parsed += 1,
                Err(err) => report.errors.push(err),
            }
        }
        logging::log_save(&format!(
            "loaded {} of {} save files ({} from backup, {} bad)",
            report.parsed,
            report.save_files,
            report.recovered,
            report.errors.len()
        ));
        report
    }

    /// Scan every save file, verifying digest and record structure. Files the
    /// primary check rejects count as recovered when their backup parses.
    pub fn validate_saves(&self) -> SaveValidationReport {
        let mut report = SaveValidationReport::default();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => {
                report.missing_dir = true;
                return report;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("sav") {
                continue;
            }
            report.save_files += 1;
            match read_verified(&path).and_then(|payload| {
                read_mobile(&payload).map_err(|err| format!("{}: {}", path.display(), err))
            }) {
                Ok(_) => report.parsed += 1,
                Err(primary_err) => {
                    let backup = path.with_extension("bak");
                    let backup_ok = read_verified(&backup)
                        .and_then(|payload| {
                            read_mobile(&payload)
                                .map_err(|err| format!("{}: {}", backup.display(), err))
                        })
                        .is_ok();
                    if backup_ok {
                        report.recovered += 1;
                    } else {
                        report.errors.push(primary_err);
                    }
                }
            }
        }
        logging::log_save(&format!(
            "validated {} save files: {} ok, {} recovered, {} bad",
            report.save_files,
            report.parsed,
            report.recovered,
            report.errors.len()
        ));
        report
    }
}

fn read_verified(path: &Path) -> Result<Vec<u8>, String> {
    let bytes =
        fs::read(path).map_err(|err| format!("read of {} failed: {}", path.display(), err))?;
    if bytes.len() < DIGEST_LEN {
        return Err(format!("{} is too short for a digest trailer", path.display()));
    }
    let (payload, trailer) = bytes.split_at(bytes.len() - DIGEST_LEN);
    if Sha1::digest(payload).as_slice() != trailer {
        return Err(format!("{} failed its digest check", path.display()));
    }
    Ok(payload.to_vec())
}
