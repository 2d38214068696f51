use crate::infra::{build_runtime, ProofingRuntime};
use clap::Args;
use idv_proofing::config::{ProofingConfig, WorkerConfig};
use idv_proofing::error::AppError;
use idv_proofing::proofing::{
    ApplicantPii, AsyncState, DocumentImages, JobOptions, PayloadEncryptor, ProofingArguments,
    ProofingJobKind, ProofingResult, SubmittedJob, VendorSet,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Only run scenarios the mock vendors verify successfully.
    #[arg(long)]
    pub(crate) skip_failures: bool,
    /// Number of proofing workers used for the demo run.
    #[arg(long, default_value_t = 2)]
    pub(crate) workers: usize,
}

struct Scenario {
    label: &'static str,
    kind: ProofingJobKind,
    arguments: ProofingArguments,
    options: JobOptions,
}

impl Scenario {
    fn new(label: &'static str, kind: ProofingJobKind, applicant: ApplicantPii) -> Self {
        Self {
            label,
            kind,
            arguments: ProofingArguments::for_applicant(applicant),
            options: JobOptions::default(),
        }
    }

    fn with_document(mut self, front_image: &str, back_image: &str) -> Self {
        self.arguments.document = Some(DocumentImages {
            front_image: front_image.to_string(),
            back_image: back_image.to_string(),
            selfie_image: None,
        });
        self
    }

    fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let worker = WorkerConfig {
        concurrency: args.workers.max(1),
        ..WorkerConfig::default()
    };
    let ProofingRuntime { service, queue, .. } = build_runtime(
        &ProofingConfig::default(),
        &worker,
        PayloadEncryptor::new(&PayloadEncryptor::generate_key()),
        VendorSet::mock(),
    );

    println!("Identity proofing demo (applicant PII is never printed)");
    let mut submitted: Vec<(&'static str, SubmittedJob)> = Vec::new();
    for scenario in scenarios(args.skip_failures) {
        let job = service.enqueue_arguments(scenario.kind, &scenario.arguments, scenario.options)?;
        println!(
            "- queued {} [{}] -> result {}",
            scenario.label,
            job.kind.label(),
            job.result_id
        );
        submitted.push((scenario.label, job));
    }

    queue.shutdown().await;

    println!("\nResults");
    for (label, job) in &submitted {
        match service.poll(&job.result_id)? {
            AsyncState::Done(result) => render_result(label, &result),
            other => println!("- {label}: {}", other.label()),
        }
    }

    Ok(())
}

fn render_result(label: &str, result: &ProofingResult) {
    let verdict = match (result.success, result.failure) {
        (true, _) => "verified".to_string(),
        (false, Some(code)) => code.code().to_string(),
        (false, None) => "not verified".to_string(),
    };
    println!("- {label}: {verdict}");

    if let Some(reason) = result.context.adjudication_reason {
        println!("  Adjudication: {}", reason.label());
    }
    for stage in &result.context.stages {
        let status = if stage.skipped {
            "skipped"
        } else if stage.success {
            "passed"
        } else if stage.timed_out {
            "timed out"
        } else {
            "failed"
        };
        println!(
            "  Stage {} via {}: {} ({} attempt(s))",
            stage.stage.label(),
            stage.vendor_name,
            status,
            stage.attempts
        );
    }
    if let Some(status) = result.aamva_status {
        println!("  AAMVA status: {status:?}");
    }
    if !result.errors.is_empty() {
        let fields: Vec<&str> = result.errors.keys().map(String::as_str).collect();
        println!("  Fields with errors: {}", fields.join(", "));
    }
    if result.pii_from_doc.is_some() {
        println!("  Document PII returned to the session (withheld)");
    }
    if !result.timing.is_empty() {
        let timing: Vec<String> = result
            .timing
            .iter()
            .map(|(name, millis)| format!("{name}={millis:.1}ms"))
            .collect();
        println!("  Timing: {}", timing.join(" "));
    }
}

fn scenarios(skip_failures: bool) -> Vec<Scenario> {
    let mut scenarios = vec![
        Scenario::new(
            "remote resolution",
            ProofingJobKind::Resolution,
            demo_applicant(),
        )
        .with_options(JobOptions {
            threatmetrix_session_id: Some("demo-session".to_string()),
            request_ip: Some("192.0.2.10".to_string()),
            ..JobOptions::default()
        }),
        Scenario::new("phone verification", ProofingJobKind::Address, demo_applicant()),
        Scenario::new(
            "in-person state id",
            ProofingJobKind::IppAamva,
            demo_applicant(),
        ),
        Scenario::new("document capture", ProofingJobKind::Document, demo_applicant())
            .with_document("uploads/demo-front.jpg", "uploads/demo-back.jpg"),
    ];

    if skip_failures {
        return scenarios;
    }

    scenarios.push(Scenario::new(
        "unverifiable name",
        ProofingJobKind::Resolution,
        ApplicantPii {
            first_name: Some("Bad".to_string()),
            ..demo_applicant()
        },
    ));
    scenarios.push(Scenario::new(
        "slow resolution vendor",
        ProofingJobKind::Resolution,
        ApplicantPii {
            first_name: Some("Time".to_string()),
            ..demo_applicant()
        },
    ));
    scenarios.push(Scenario::new(
        "unverifiable phone",
        ProofingJobKind::Address,
        ApplicantPii {
            phone: Some("555-555-5555".to_string()),
            ..demo_applicant()
        },
    ));
    scenarios.push(
        Scenario::new(
            "rejected document",
            ProofingJobKind::Document,
            demo_applicant(),
        )
        .with_document("uploads/fail-front.jpg", "uploads/demo-back.jpg"),
    );

    scenarios
}

fn demo_applicant() -> ApplicantPii {
    ApplicantPii {
        first_name: Some("Fakey".to_string()),
        last_name: Some("McFakerson".to_string()),
        dob: Some("1938-10-06".to_string()),
        ssn: Some("900-12-3456".to_string()),
        address1: Some("1 Fake Street".to_string()),
        city: Some("Great Falls".to_string()),
        state: Some("MT".to_string()),
        zipcode: Some("59010".to_string()),
        state_id_number: Some("1111111111111".to_string()),
        state_id_jurisdiction: Some("ND".to_string()),
        state_id_type: Some("drivers_license".to_string()),
        phone: Some("+1 (406) 555-0100".to_string()),
        ..ApplicantPii::default()
    }
}
