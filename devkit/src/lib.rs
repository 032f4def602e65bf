/*!
# TrafficDash DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le test de la console sans backend réel:
- Backend HTTP stub (all-stats, signal-control, streetlight, démos)
- Builders de payloads au format du backend
- Harness de test (logging, attente de conditions)
*/

pub mod payloads;
pub mod stub_backend;
pub mod test_utils;

pub use payloads::{signal_status, streetlight_status, SnapshotBuilder};
pub use stub_backend::{StubBackend, StubReply};
pub use test_utils::{wait_until, TestHarness};
