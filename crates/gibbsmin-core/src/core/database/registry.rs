use super::Database;
use crate::core::energy::EnergyFunction;
use crate::core::energy::params::ModelParameter;
use crate::core::energy::redlich_kister::{ModelError, RedlichKisterModel};
use crate::core::models::ids::PhaseKey;
use crate::core::models::phase::{PhaseDefinition, PhaseDefinitionError, Sublattice};
use serde::Deserialize;
use slotmap::SlotMap;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabaseFile {
    #[serde(default)]
    phases: BTreeMap<String, PhaseRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PhaseRecord {
    sublattices: Vec<Sublattice>,
    #[serde(default)]
    parameters: Vec<ModelParameter>,
}

struct PhaseEntry {
    definition: PhaseDefinition,
    energy: Box<dyn EnergyFunction>,
}

/// In-memory phase database.
#[derive(Default)]
pub struct PhaseDatabase {
    phases: SlotMap<PhaseKey, PhaseEntry>,
    name_to_key: BTreeMap<String, PhaseKey>,
}

impl PhaseDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a database of Redlich-Kister phases from a TOML file.
    pub fn load(path: &Path) -> Result<Self, DatabaseLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| DatabaseLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: DatabaseFile = toml::from_str(&content).map_err(|e| DatabaseLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        let mut database = Self::new();
        for (name, record) in file.phases {
            let definition = PhaseDefinition::new(&name, record.sublattices);
            let model = RedlichKisterModel::new(&definition, &record.parameters).map_err(|e| {
                DatabaseLoadError::Model {
                    phase: name.clone(),
                    source: e,
                }
            })?;
            debug!(phase = %name, terms = model.term_count(), "Loaded phase model");
            database
                .insert(definition, model)
                .map_err(|e| DatabaseLoadError::Model {
                    phase: name.clone(),
                    source: e.into(),
                })?;
        }
        Ok(database)
    }

    /// Adds a phase, replacing any phase of the same name.
    pub fn insert<E>(
        &mut self,
        definition: PhaseDefinition,
        energy: E,
    ) -> Result<PhaseKey, PhaseDefinitionError>
    where
        E: EnergyFunction + 'static,
    {
        definition.validate()?;
        if let Some(old) = self.name_to_key.remove(&definition.name) {
            self.phases.remove(old);
        }
        let name = definition.name.clone();
        let key = self.phases.insert(PhaseEntry {
            definition,
            energy: Box::new(energy),
        });
        self.name_to_key.insert(name, key);
        Ok(key)
    }

    pub fn key_of(&self, name: &str) -> Option<PhaseKey> {
        self.name_to_key.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

impl Database for PhaseDatabase {
    fn phase_names(&self) -> Vec<String> {
        self.name_to_key.keys().cloned().collect()
    }

    fn phase(&self, name: &str) -> Option<&PhaseDefinition> {
        let key = self.key_of(name)?;
        self.phases.get(key).map(|entry| &entry.definition)
    }

    fn energy_function(&self, name: &str) -> Option<&dyn EnergyFunction> {
        let key = self.key_of(name)?;
        self.phases.get(key).map(|entry| entry.energy.as_ref())
    }
}

#[derive(Debug, Error)]
pub enum DatabaseLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid model for phase '{phase}': {source}")]
    Model { phase: String, source: ModelError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::EnergyEvaluation;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DATABASE_TOML: &str = r#"
[phases.LIQUID]
sublattices = [{ multiplicity = 1.0, constituents = ["A", "B"] }]
parameters = [
  { constituents = [["A"]], value = { a = -100.0 } },
  { constituents = [["B"]], value = { a = -200.0 } },
  { constituents = [["A", "B"]], order = 0, value = { a = -10000.0, b = 2.0 } },
]

[phases.AB2]
sublattices = [
  { multiplicity = 1.0, constituents = ["A"] },
  { multiplicity = 2.0, constituents = ["B"] },
]
parameters = [{ constituents = [["A"], ["B"]], value = { a = -30000.0 } }]
"#;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn load_reads_phases_in_sorted_order() {
        let file = write_temp(DATABASE_TOML);
        let database = PhaseDatabase::load(file.path()).unwrap();

        assert_eq!(database.len(), 2);
        assert_eq!(database.phase_names(), vec!["AB2", "LIQUID"]);
        let ab2 = database.phase("AB2").unwrap();
        assert!(ab2.is_stoichiometric());
        assert_eq!(ab2.multiplicities(), vec![1.0, 2.0]);
    }

    #[test]
    fn loaded_model_evaluates_endmember_energy() {
        let file = write_temp(DATABASE_TOML);
        let database = PhaseDatabase::load(file.path()).unwrap();
        let energy = database.energy_function("AB2").unwrap();
        // Energy is per mole of atoms: three atoms per formula unit.
        let eval = energy.evaluate(&[1.0, 1.0], 1000.0, 1e5);
        assert!((eval.energy + 10000.0).abs() < 1e-9);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let result = PhaseDatabase::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(DatabaseLoadError::Io { .. })));
    }

    #[test]
    fn load_fails_for_malformed_toml() {
        let file = write_temp("[phases.LIQUID]\nsublattices = 3");
        let result = PhaseDatabase::load(file.path());
        assert!(matches!(result, Err(DatabaseLoadError::Toml { .. })));
    }

    #[test]
    fn load_fails_for_parameter_with_unknown_constituent() {
        let file = write_temp(
            r#"
[phases.LIQUID]
sublattices = [{ multiplicity = 1.0, constituents = ["A", "B"] }]
parameters = [{ constituents = [["C"]], value = { a = 1.0 } }]
"#,
        );
        let result = PhaseDatabase::load(file.path());
        assert!(matches!(
            result,
            Err(DatabaseLoadError::Model { phase, .. }) if phase == "LIQUID"
        ));
    }

    #[test]
    fn insert_replaces_phase_with_same_name() {
        let mut database = PhaseDatabase::new();
        let definition = PhaseDefinition::new("X", vec![Sublattice::new(1.0, &["A"])]);
        let first = database
            .insert(definition.clone(), |y: &[f64], _t: f64, _p: f64| {
                EnergyEvaluation::constant(1.0, y.len())
            })
            .unwrap();
        let second = database
            .insert(definition, |y: &[f64], _t: f64, _p: f64| {
                EnergyEvaluation::constant(2.0, y.len())
            })
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(database.len(), 1);
        let eval = database.energy_function("X").unwrap().evaluate(&[1.0], 300.0, 1e5);
        assert_eq!(eval.energy, 2.0);
    }

    #[test]
    fn insert_rejects_invalid_definition() {
        let mut database = PhaseDatabase::new();
        let definition = PhaseDefinition::new("X", vec![Sublattice::new(1.0, &[])]);
        let result = database.insert(definition, |y: &[f64], _t: f64, _p: f64| {
            EnergyEvaluation::constant(0.0, y.len())
        });
        assert!(result.is_err());
        assert!(database.is_empty());
    }
}
