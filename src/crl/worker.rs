//! Bridges `CrlValidator::validate_chain` (an `async fn`) into the strictly
//! synchronous `ServerCertVerifier::verify_server_cert` call rustls makes.
//!
//! `verify_server_cert` is usually invoked from inside a caller's own Tokio
//! runtime (a `reqwest` client driving the handshake). Calling
//! `Runtime::block_on` directly from that call stack panics ("Cannot start a
//! runtime from within a runtime"). `CrlWorker` sidesteps this by owning a
//! dedicated OS thread with its own multi-thread runtime; validation jobs are
//! shipped to it over a blocking channel and each job is `tokio::spawn`ed
//! rather than run serially, so concurrent handshakes still validate
//! concurrently instead of queueing behind one another.

use crate::crl::error::CrlError;
use crate::crl::validator::CrlValidator;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

struct Job {
    validator: Arc<CrlValidator>,
    chain: Vec<Vec<u8>>,
    reply: std_mpsc::Sender<Result<(), CrlError>>,
}

pub struct CrlWorker {
    job_tx: std_mpsc::Sender<Job>,
}

impl CrlWorker {
    pub fn global() -> &'static CrlWorker {
        static INSTANCE: OnceCell<CrlWorker> = OnceCell::new();
        INSTANCE.get_or_init(CrlWorker::spawn)
    }

    fn spawn() -> Self {
        let (job_tx, job_rx) = std_mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name("crl-worker".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .expect("failed to create CRL worker runtime");
                rt.block_on(async move {
                    while let Ok(job) = job_rx.recv() {
                        tokio::spawn(async move {
                            let result = job.validator.validate_chain(&job.chain).await;
                            let _ = job.reply.send(result);
                        });
                    }
                });
            })
            .expect("failed to spawn CRL worker thread");
        Self { job_tx }
    }

    /// Synchronously validate one anchored chain. Safe to call from within
    /// an ambient async runtime: the work happens on the dedicated worker
    /// thread, and this call only blocks the calling thread, not any
    /// runtime.
    pub fn validate(&self, validator: Arc<CrlValidator>, chain: Vec<Vec<u8>>) -> Result<(), CrlError> {
        let (reply_tx, reply_rx) = std_mpsc::channel();
        let job = Job {
            validator,
            chain,
            reply: reply_tx,
        };
        if self.job_tx.send(job).is_err() {
            return crate::crl::error::NotDeterminedSnafu {}.fail();
        }
        match reply_rx.recv() {
            Ok(result) => result,
            Err(_) => crate::crl::error::NotDeterminedSnafu {}.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crl::config::{CertRevocationCheckMode, CrlConfig};
    use crate::tls::test_helpers::x509 as th;

    #[test]
    fn validate_runs_from_within_an_ambient_tokio_runtime() {
        th::test_setup();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            // Simulate the ambient runtime reqwest would already be inside.
            let root_key = th::gen_key();
            let root = th::sign_cert(
                &th::gen_req("WR", &root_key),
                &th::make_name("WR"),
                &root_key,
                true,
            );
            let ee_key = th::gen_key();
            let ee = th::sign_cert(
                &th::gen_req("WE", &ee_key),
                root.subject_name(),
                &root_key,
                false,
            );
            let validator = Arc::new(
                CrlValidator::new(CrlConfig {
                    check_mode: CertRevocationCheckMode::Advisory,
                    allow_certificates_without_crl_url: true,
                    ..Default::default()
                })
                .unwrap(),
            );
            let chain = vec![ee.to_der().unwrap(), root.to_der().unwrap()];
            let worker = CrlWorker::global();
            let result = worker.validate(validator, chain);
            assert!(result.is_ok());
        });
    }

    #[test]
    fn concurrent_validations_do_not_serialize_indefinitely() {
        th::test_setup();
        let root_key = th::gen_key();
        let root = th::sign_cert(
            &th::gen_req("CR", &root_key),
            &th::make_name("CR"),
            &root_key,
            true,
        );
        let validator = Arc::new(
            CrlValidator::new(CrlConfig {
                check_mode: CertRevocationCheckMode::Advisory,
                allow_certificates_without_crl_url: true,
                ..Default::default()
            })
            .unwrap(),
        );
        let worker = CrlWorker::global();
        let mut handles = Vec::new();
        for i in 0..4 {
            let ee_key = th::gen_key();
            let ee = th::sign_cert(
                &th::gen_req(&format!("CE{i}"), &ee_key),
                root.subject_name(),
                &root_key,
                false,
            );
            let chain = vec![ee.to_der().unwrap(), root.to_der().unwrap()];
            let validator = validator.clone();
            handles.push(std::thread::spawn(move || worker.validate(validator, chain)));
        }
        for h in handles {
            assert!(h.join().unwrap().is_ok());
        }
    }
}
