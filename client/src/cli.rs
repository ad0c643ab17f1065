use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use common::{ClientProtocol, JobConf, JobStatus, RunState, SubmitJobRequest};
use runner::{stage_job, LocalFs, LocalJobRunner, LogNotifier, RunnerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use worker::WordCount;

/// Cada cuánto se consulta el estado del job mientras corre.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Corre jobs WordCount con el runner local")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct JobArgs {
    #[arg(value_name = "NOMBRE")]
    name: String,

    /// Patrón de entrada, ej: "/data/input/*.txt"
    #[arg(value_name = "INPUT_GLOB")]
    input_glob: String,

    #[arg(value_name = "OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Reducers pedidos (en modo local corre 0 ó 1)
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    reduces: i32,

    /// Máximo de maps corriendo a la vez
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    max_maps: i64,

    /// URL a la que se avisa el fin del job ($jobId y $jobStatus se reemplazan)
    #[arg(long)]
    notify_url: Option<String>,

    /// Reintentos del aviso de fin
    #[arg(long, default_value_t = 0)]
    notify_retries: u32,
}

impl JobArgs {
    fn into_conf(self) -> JobConf {
        let mut conf = JobConf::new(self.name, self.output_dir);
        conf.input_glob = self.input_glob;
        conf.num_reduce_tasks = self.reduces;
        conf.local_max_maps = self.max_maps;
        conf.end_notification_url = self.notify_url;
        conf.end_notification_retries = self.notify_retries;
        conf
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Prepara, envía y espera un job WordCount
    Run {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Sólo deja el directorio de envío listo (job.json + job.splits.json)
    Stage {
        #[command(flatten)]
        job: JobArgs,

        #[arg(long, value_name = "SUBMIT_DIR")]
        submit_dir: PathBuf,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { job } => run_job(RunnerConfig::from_env(), job.into_conf()).await,
        Commands::Stage { job, submit_dir } => {
            let conf = job.into_conf();
            let splits = stage_job(&LocalFs, &submit_dir, &conf)?;

            println!("Job preparado:");
            println!("  nombre: {}", conf.name);
            println!("  directorio: {}", submit_dir.display());
            println!("  splits: {}", splits.len());
            for s in &splits {
                println!("    [{}] {} ({} bytes)", s.index, s.location.display(), s.length);
            }
            Ok(())
        }
    }
}

async fn run_job(config: RunnerConfig, conf: JobConf) -> Result<()> {
    let mut builder = LocalJobRunner::builder(config, Arc::new(WordCount));
    if conf.end_notification_url.is_none() {
        builder = builder.with_notifier(Arc::new(LogNotifier));
    }
    let runner = builder.build();

    let job_id = runner.new_job_id().await;
    // la limpieza del job borra este directorio entero
    let submit_dir = runner.config().staging_root.join(job_id.to_string());
    stage_job(&LocalFs, &submit_dir, &conf)?;

    let submitted = runner
        .submit_job(SubmitJobRequest {
            job_id: Some(job_id.clone()),
            submit_dir,
        })
        .await?;

    println!("Job enviado:");
    println!("  id: {}", submitted.job_id);
    println!("  nombre: {}", submitted.name);
    println!("  usuario: {}", submitted.user);

    let mut last_line = String::new();
    loop {
        let Some(status) = runner.job_status(&job_id).await else {
            bail!("el runner no conoce el job {job_id}");
        };

        let line = progress_line(&status);
        if line != last_line {
            info!("{}", line);
            last_line = line;
        }
        if status.is_complete() {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    // el estado terminal se publica antes de la limpieza y del aviso de fin
    let status = runner.wait_for_completion(&job_id).await?;
    let counters = runner.job_counters(&job_id).await?;

    println!("Job terminado:");
    println!("  id: {}", status.job_id);
    println!("  estado: {}", status.run_state.as_str());
    if let Some(finished) = status.finished_at {
        let secs = (finished - status.submitted_at).num_milliseconds() as f64 / 1000.0;
        println!("  duración: {secs:.2}s");
    }
    println!("  salida: {}", conf.output_dir.display());
    println!("  contadores:");
    println!("{}", serde_json::to_string_pretty(&counters)?);

    match status.run_state {
        RunState::Succeeded => Ok(()),
        other => {
            let cause = runner
                .controller(&job_id)
                .and_then(|c| c.failure())
                .unwrap_or_else(|| "sin detalle".to_string());
            bail!("el job {} terminó en {}: {}", job_id, other.as_str(), cause)
        }
    }
}

fn progress_line(status: &JobStatus) -> String {
    format!(
        "{} {} setup {:.0}% map {:.0}% reduce {:.0}% cleanup {:.0}%",
        status.job_id,
        status.run_state.as_str(),
        status.setup_progress * 100.0,
        status.map_progress * 100.0,
        status.reduce_progress * 100.0,
        status.cleanup_progress * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_args_build_the_descriptor() {
        let cli = Cli::parse_from([
            "client",
            "run",
            "wc",
            "/data/input/*.txt",
            "/data/output",
            "--reduces",
            "-3",
            "--max-maps",
            "4",
            "--notify-url",
            "http://localhost/fin?id=$jobId",
        ]);
        let Commands::Run { job } = cli.command else {
            panic!("esperaba el subcomando run");
        };
        let conf = job.into_conf();

        assert_eq!(conf.name, "wc");
        assert_eq!(conf.input_glob, "/data/input/*.txt");
        assert_eq!(conf.num_reduce_tasks, -3);
        assert_eq!(conf.effective_reduce_tasks(), 1);
        assert_eq!(conf.local_max_maps, 4);
        assert_eq!(
            conf.end_notification_url.as_deref(),
            Some("http://localhost/fin?id=$jobId")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_run_leaves_nothing_in_the_staging_root() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.txt"), "hola mundo hola\n").unwrap();

        let mut conf = JobConf::new("wc", tmp.path().join("out"));
        conf.input_glob = format!("{}/*.txt", input.display());
        let config = RunnerConfig::rooted_at(tmp.path());
        let staging_root = config.staging_root.clone();

        run_job(config, conf).await.unwrap();

        assert!(tmp.path().join("out").join("_SUCCESS").exists());
        let leftovers = std::fs::read_dir(&staging_root)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0, "quedó algo en {}", staging_root.display());
    }

    #[test]
    fn stage_requires_a_submit_dir() {
        assert!(Cli::try_parse_from(["client", "stage", "wc", "/in/*", "/out"]).is_err());
        assert!(Cli::try_parse_from([
            "client",
            "stage",
            "wc",
            "/in/*",
            "/out",
            "--submit-dir",
            "/tmp/submit"
        ])
        .is_ok());
    }
}
