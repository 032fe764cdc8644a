use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let fetch_args = || {
        [
            clap::arg!(--timeout <SECS> "HTTP timeout in seconds").default_value("30"),
            clap::arg!(--"user-agent" <UA> "Custom User-Agent for HTTP requests").value_name("UA"),
        ]
    };

    let mut cmd = clap::Command::new("quarry")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Quarry Contributors")
        .about("Capture structured records from web pages")
        .arg(clap::arg!(-v --verbose "Enable debug logging").global(true))
        .subcommand(
            clap::Command::new("run")
                .about("Run a job: fetch uncaptured targets, save captures, write shards")
                .arg(
                    clap::arg!(<JOB> "Job file (JSON)").value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    clap::arg!(--"output-root" <DIR> "Override the job's output root")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(clap::arg!(--concurrency <NUM> "Override the number of targets fetched at once"))
                .args(fetch_args()),
        )
        .subcommand(
            clap::Command::new("validate")
                .about("Check a schema file (or the schema of a job file)")
                .arg(
                    clap::arg!(<FILE> "Schema or job file (JSON)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            clap::Command::new("extract")
                .about("Extract records from one page and print them as JSON")
                .arg(
                    clap::arg!(<SCHEMA> "Schema file (JSON)").value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(clap::arg!(<INPUT> "URL to fetch, local HTML file, or '-' for stdin"))
                .arg(
                    clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .args(fetch_args()),
        );

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "quarry", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "quarry", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "quarry", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "quarry", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
