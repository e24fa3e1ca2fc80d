//! Bridges `OcspValidator::validate_chain` into the synchronous
//! `ServerCertVerifier::verify_server_cert` call, the same way
//! `crate::crl::worker::CrlWorker` bridges `CrlValidator`: a dedicated OS
//! thread runs its own multi-thread Tokio runtime, and jobs are
//! `tokio::spawn`ed rather than run serially so concurrent handshakes don't
//! queue behind one another.

use crate::ocsp::error::OcspError;
use crate::ocsp::validator::OcspValidator;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

struct Job {
    validator: Arc<OcspValidator>,
    chain: Vec<Vec<u8>>,
    reply: std_mpsc::Sender<Result<(), OcspError>>,
}

pub struct OcspWorker {
    job_tx: std_mpsc::Sender<Job>,
}

impl OcspWorker {
    pub fn global() -> &'static OcspWorker {
        static INSTANCE: OnceCell<OcspWorker> = OnceCell::new();
        INSTANCE.get_or_init(OcspWorker::spawn)
    }

    fn spawn() -> Self {
        let (job_tx, job_rx) = std_mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name("ocsp-worker".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .expect("failed to create OCSP worker runtime");
                rt.block_on(async move {
                    while let Ok(job) = job_rx.recv() {
                        tokio::spawn(async move {
                            let result = job.validator.validate_chain(&job.chain).await;
                            let _ = job.reply.send(result);
                        });
                    }
                });
            })
            .expect("failed to spawn OCSP worker thread");
        Self { job_tx }
    }

    pub fn validate(
        &self,
        validator: Arc<OcspValidator>,
        chain: Vec<Vec<u8>>,
    ) -> Result<(), OcspError> {
        let (reply_tx, reply_rx) = std_mpsc::channel();
        let job = Job {
            validator,
            chain,
            reply: reply_tx,
        };
        if self.job_tx.send(job).is_err() {
            return crate::ocsp::error::NotDeterminedSnafu {}.fail();
        }
        match reply_rx.recv() {
            Ok(result) => result,
            Err(_) => crate::ocsp::error::NotDeterminedSnafu {}.fail(),
        }
    }
}
