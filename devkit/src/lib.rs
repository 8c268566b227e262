/*!
# Edgepick DevKit - Doubles et utilitaires de test

Bibliothèque facilitant les tests des crates Edgepick avec:
- Sonde scriptée (latences, échecs, délais, panique) sans réseau
- Horloge fixe pilotable
- Store et inventaire défaillants à la demande
- Fixtures pour équipements, rapports d'hôte et batches
*/

pub mod fixtures;
pub mod probe_stub;
pub mod test_utils;

pub use anyhow;
pub use fixtures::{batch, target, targets, AssetBuilder, ReportBuilder};
pub use probe_stub::{FixedClock, MockProbe, ProbeCall};
pub use test_utils::{FailingInventory, FaultyStore, TestHarness};
