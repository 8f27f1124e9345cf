use log::info;

use crate::config::Config;
use crate::credential::{CredentialInfo, CredentialStore};
use crate::embedding::Embedding;
use crate::errors::{EngineError, EngineResult};
use crate::livescan::{LiveScanController, ProbeSource, ScanOptions};
use crate::matcher::{self, Comparison};
use crate::search::{self, MatchResult};
use crate::store::{EmbeddingStore, Identity};
use crate::vision::FaceModel;

/// Explicitly owned engine facade.
///
/// Construct one per process and pass it to request handlers; there is no
/// ambient global instance. Every engine-facing call takes a presented
/// credential first and fails with `Unauthorized` before touching the
/// stores. Credential administration itself is the local-admin surface and
/// is not key-gated.
pub struct FaceGate {
    config: Config,
    identities: EmbeddingStore,
    credentials: CredentialStore,
}

impl FaceGate {
    pub fn new(config: Config, identities: EmbeddingStore, credentials: CredentialStore) -> Self {
        Self {
            config,
            identities,
            credentials,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn authorize(&self, key: &str) -> EngineResult<()> {
        if self.credentials.validate(key) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized)
        }
    }

    fn check_dimension(&self, embedding: &Embedding) -> EngineResult<()> {
        if embedding.dim() != self.config.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.config.dimension,
                found: embedding.dim(),
            });
        }
        Ok(())
    }

    pub fn enroll(&mut self, key: &str, name: &str, embedding: Embedding) -> EngineResult<Identity> {
        self.authorize(key)?;
        let identity = self.identities.insert(name, embedding)?;
        info!("enrolled identity {} ('{}')", identity.id, identity.name);
        Ok(identity)
    }

    pub fn identities(&self, key: &str) -> EngineResult<Vec<Identity>> {
        self.authorize(key)?;
        Ok(self.identities.list_all())
    }

    /// Administrative removal; enrollment is otherwise append-only.
    pub fn remove_identity(&mut self, key: &str, id: u64) -> EngineResult<()> {
        self.authorize(key)?;
        self.identities.remove(id)?;
        info!("removed identity {id}");
        Ok(())
    }

    /// Administrative: drop every enrolled identity and the backing file.
    pub fn purge_identities(&mut self, key: &str) -> EngineResult<()> {
        self.authorize(key)?;
        self.identities.purge()?;
        info!("purged identity store");
        Ok(())
    }

    pub fn search(&self, key: &str, probe: &Embedding, k: usize) -> EngineResult<Vec<MatchResult>> {
        self.authorize(key)?;
        search::search(&self.identities, probe, k, self.config.threshold)
    }

    /// One-shot embedding-vs-embedding verification. Both embeddings must
    /// have the deployment dimension, not merely match each other.
    pub fn verify(&self, key: &str, a: &Embedding, b: &Embedding) -> EngineResult<Comparison> {
        self.authorize(key)?;
        self.check_dimension(a)?;
        self.check_dimension(b)?;
        matcher::compare(a, b, self.config.threshold)
    }

    /// One-shot image-vs-image verification through an external face model.
    pub fn verify_images<M: FaceModel>(
        &self,
        key: &str,
        model: &mut M,
        a: &[u8],
        b: &[u8],
    ) -> EngineResult<Comparison> {
        self.authorize(key)?;
        let ea = model.embed(a)?;
        let eb = model.embed(b)?;
        self.check_dimension(&ea)?;
        self.check_dimension(&eb)?;
        matcher::compare(&ea, &eb, self.config.threshold)
    }

    /// A controller sized for this deployment's dimension and threshold.
    pub fn scan_controller(&self) -> LiveScanController {
        LiveScanController::new(self.config.dimension, self.config.threshold)
    }

    pub fn start_scan<S: ProbeSource>(
        &self,
        key: &str,
        controller: &mut LiveScanController,
        source: S,
        target: Embedding,
        opts: ScanOptions,
    ) -> EngineResult<()> {
        self.authorize(key)?;
        controller.start(source, target, opts)
    }

    // Credential administration (local admin surface).

    pub fn issue_key(&mut self, label: &str) -> EngineResult<(String, CredentialInfo)> {
        self.credentials.issue(label)
    }

    pub fn revoke_key(&mut self, id: u64) -> EngineResult<()> {
        self.credentials.revoke(id)
    }

    pub fn list_keys(&self) -> Vec<CredentialInfo> {
        self.credentials.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> FaceGate {
        let config = Config {
            dimension: 4,
            ..Config::default()
        };
        let identities = EmbeddingStore::in_memory(4);
        FaceGate::new(config, identities, CredentialStore::in_memory())
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::from_raw(values.to_vec())
    }

    #[test]
    fn engine_calls_require_a_valid_key() {
        let mut gate = gate();
        let err = gate
            .enroll("fg_bogus", "alice", emb(&[1.0, 0.0, 0.0, 0.0]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized));
        assert!(matches!(
            gate.identities("").unwrap_err(),
            EngineError::Unauthorized
        ));
    }

    #[test]
    fn issued_key_unlocks_the_engine_until_revoked() {
        let mut gate = gate();
        let (key, info) = gate.issue_key("handler").unwrap();

        gate.enroll(&key, "alice", emb(&[1.0, 0.0, 0.0, 0.0])).unwrap();
        let hits = gate.search(&key, &emb(&[1.0, 0.0, 0.0, 0.0]), 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].verified);

        gate.revoke_key(info.id).unwrap();
        assert!(matches!(
            gate.search(&key, &emb(&[1.0, 0.0, 0.0, 0.0]), 5),
            Err(EngineError::Unauthorized)
        ));
    }

    #[test]
    fn verify_uses_configured_threshold() {
        let mut gate = gate();
        let (key, _) = gate.issue_key("handler").unwrap();
        let cmp = gate
            .verify(&key, &emb(&[1.0, 0.0, 0.0, 0.0]), &emb(&[0.9, 0.1, 0.0, 0.0]))
            .unwrap();
        assert!(cmp.verified);
    }

    #[test]
    fn verify_rejects_embeddings_off_the_deployment_dimension() {
        let mut gate = gate();
        let (key, _) = gate.issue_key("handler").unwrap();
        // The pair matches itself but not the configured dimension.
        match gate.verify(&key, &emb(&[1.0, 0.0, 0.0]), &emb(&[1.0, 0.0, 0.0])) {
            Err(EngineError::DimensionMismatch {
                expected: 4,
                found: 3,
            }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        // Mixed pairs fail too, on the first offending side.
        assert!(matches!(
            gate.verify(&key, &emb(&[1.0, 0.0, 0.0, 0.0]), &emb(&[1.0, 0.0])),
            Err(EngineError::DimensionMismatch {
                expected: 4,
                found: 2,
            })
        ));
    }

    struct FixedModel {
        dim: usize,
    }

    impl crate::vision::FaceModel for FixedModel {
        fn detect(&mut self, _image: &[u8]) -> EngineResult<crate::vision::Detection> {
            Ok(crate::vision::Detection {
                bbox: [0.0, 0.0, 10.0, 10.0],
                landmarks: [0.0; 10],
                confidence: 0.9,
                spoofing: false,
                multiple_faces: false,
            })
        }

        fn embed(&mut self, _image: &[u8]) -> EngineResult<Embedding> {
            Ok(Embedding::from_raw(vec![1.0; self.dim]))
        }
    }

    #[test]
    fn verify_images_checks_model_output_dimension() {
        let mut gate = gate();
        let (key, _) = gate.issue_key("handler").unwrap();

        let mut short_model = FixedModel { dim: 3 };
        assert!(matches!(
            gate.verify_images(&key, &mut short_model, b"a", b"b"),
            Err(EngineError::DimensionMismatch {
                expected: 4,
                found: 3,
            })
        ));

        let mut model = FixedModel { dim: 4 };
        let cmp = gate.verify_images(&key, &mut model, b"a", b"b").unwrap();
        assert!(cmp.verified);
    }

    #[test]
    fn purge_clears_enrolled_identities() {
        let mut gate = gate();
        let (key, _) = gate.issue_key("admin").unwrap();
        gate.enroll(&key, "alice", emb(&[1.0, 0.0, 0.0, 0.0])).unwrap();

        assert!(matches!(
            gate.purge_identities("fg_nope"),
            Err(EngineError::Unauthorized)
        ));
        gate.purge_identities(&key).unwrap();
        assert!(gate.identities(&key).unwrap().is_empty());
    }
}
