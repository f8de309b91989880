#![forbid(unsafe_code)]

//! dss command line host: signs and verifies documents with local keys, a
//! local time-stamp authority and locally supplied revocation data.

use std::path::{Path, PathBuf};
use std::process;

use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use dss_core::config::DssConfig;
use dss_core::Error;
use dss_crypto::DigestAlgo;
use dss_document::{
    Capabilities, ContentType, SignatureService, SigningRequest, VerificationService,
};
use dss_keys::{cert, loader, TrustStore};
use dss_xades::local::{
    LocalSigner, LocalTimestampService, LocalTimestampValidator, StaticRevocationSource,
    TrustStoreValidator,
};
use dss_xades::RevocationData;

#[derive(Parser)]
#[command(
    name = "dss",
    about = "eID DSS: XAdES-X-L signatures for XML, ZIP, ODF, ASiC and OOXML documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a document
    Sign {
        /// Document to sign
        file: PathBuf,

        /// Private key (PEM or DER)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Signer certificate (PEM or DER)
        #[arg(long)]
        cert: PathBuf,

        /// Intermediate and root certificates, in chain order
        #[arg(long)]
        chain: Vec<PathBuf>,

        /// xml, zip, odf, asic, ooxml or a MIME type
        #[arg(short = 't', long = "content-type")]
        content_type: String,

        /// Signature digest (sha1, sha256, sha512)
        #[arg(long)]
        digest: Option<String>,

        /// Claimed signer role
        #[arg(long)]
        role: Option<String>,

        /// DER encoded CRLs to embed
        #[arg(long)]
        crl: Vec<PathBuf>,

        /// DER encoded OCSP responses to embed
        #[arg(long)]
        ocsp: Vec<PathBuf>,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the valid signatures of a document
    Verify {
        /// Signed document
        file: PathBuf,

        /// Trusted root certificates
        #[arg(long, required = true)]
        trusted: Vec<PathBuf>,

        /// xml, zip, odf, asic, ooxml or a MIME type
        #[arg(short = 't', long = "content-type")]
        content_type: String,

        /// The unsigned document the signatures must cover
        #[arg(long)]
        original: Option<PathBuf>,

        /// Require revocation evidence for every certificate
        #[arg(long = "require-revocation")]
        require_revocation: bool,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the entries of a container a signature would cover
    Entries {
        file: PathBuf,

        #[arg(short = 't', long = "content-type")]
        content_type: String,
    },

    /// List supported content types and algorithms
    Info,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sign {
            file,
            key,
            cert,
            chain,
            content_type,
            digest,
            role,
            crl,
            ocsp,
            config,
            output,
        } => cmd_sign(SignArgs {
            file,
            key,
            cert,
            chain,
            content_type,
            digest,
            role,
            crl,
            ocsp,
            config,
            output,
        }),

        Commands::Verify {
            file,
            trusted,
            content_type,
            original,
            require_revocation,
            config,
        } => cmd_verify(file, trusted, content_type, original, require_revocation, config),

        Commands::Entries { file, content_type } => cmd_entries(file, content_type),

        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

struct SignArgs {
    file: PathBuf,
    key: PathBuf,
    cert: PathBuf,
    chain: Vec<PathBuf>,
    content_type: String,
    digest: Option<String>,
    role: Option<String>,
    crl: Vec<PathBuf>,
    ocsp: Vec<PathBuf>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn cmd_sign(args: SignArgs) -> Result<(), Error> {
    let config = load_config(args.config.as_deref())?;
    let content_type: ContentType = args.content_type.parse()?;

    let mut cert_paths: Vec<&Path> = vec![args.cert.as_path()];
    cert_paths.extend(args.chain.iter().map(PathBuf::as_path));
    let credential = loader::load_credential(&args.key, &cert_paths)?;

    let mut revocation = RevocationData::default();
    for path in &args.ocsp {
        revocation.ocsp_responses.push(read_file(path)?);
    }
    for path in &args.crl {
        revocation.crls.push(read_file(path)?);
    }

    let mut request = SigningRequest::new(read_file(&args.file)?, content_type);
    if let Some(digest) = &args.digest {
        request = request.with_digest(DigestAlgo::from_name(digest)?);
    }
    if let Some(role) = args.role {
        request = request.with_role(role);
    }

    let tsa = LocalTimestampService::new(credential.clone(), revocation.clone());
    let revocation = StaticRevocationSource::new(revocation);
    let capabilities = Capabilities {
        timestamp: &tsa,
        revocation: &revocation,
    };
    let service = SignatureService::new(&request, capabilities, &config)?;
    let signer = LocalSigner::new(credential);

    let mut out = Vec::new();
    service.sign(&signer, signer.chain(), &mut out)?;
    write_output(args.output, &out)
}

fn cmd_verify(
    file: PathBuf,
    trusted: Vec<PathBuf>,
    content_type: String,
    original: Option<PathBuf>,
    require_revocation: bool,
    config: Option<PathBuf>,
) -> Result<(), Error> {
    let config = load_config(config.as_deref())?;
    let content_type: ContentType = content_type.parse()?;
    let mut store = TrustStore::new();
    for path in &trusted {
        let count = store.load_file(path)?;
        log::debug!("{count} trust anchor(s) from {}", path.display());
    }
    let trust = TrustStoreValidator::new(store.clone(), require_revocation);
    let timestamps = LocalTimestampValidator::new(store);
    let verifier = VerificationService::new(&trust, &timestamps, config);

    let document = read_file(&file)?;
    let original = original.as_deref().map(read_file).transpose()?;
    let infos = verifier.verify_signatures(&document, content_type, original.as_deref())?;
    if infos.is_empty() {
        println!("no valid signatures");
    }
    for info in &infos {
        let signer = cert::parse_certificate(&info.signer)?;
        let mut line = format!(
            "{} signed at {}",
            cert::subject_name(&signer),
            info.signing_time.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        if let Some(role) = &info.role {
            line.push_str(&format!(" as {role}"));
        }
        if let Some(identity) = &info.identity {
            line.push_str(&format!(" ({} {})", identity.first_name, identity.name));
        }
        println!("{line}");
    }
    Ok(())
}

fn cmd_entries(file: PathBuf, content_type: String) -> Result<(), Error> {
    let content_type: ContentType = content_type.parse()?;
    for name in dss_document::visualize(&read_file(&file)?, content_type)? {
        println!("{name}");
    }
    Ok(())
}

fn cmd_info() -> Result<(), Error> {
    println!("eID DSS signature engine");
    println!();
    println!("Content types:");
    for ct in ContentType::ALL {
        println!("  {:<6} {}", ct.name(), ct.mime_type());
    }
    println!();
    println!("Signature digests:");
    println!("  SHA-1, SHA-256, SHA-512 (ODF: SHA-1 only)");
    println!();
    println!("Signature algorithms:");
    println!("  RSA PKCS#1 v1.5, ECDSA P-256/P-384");
    println!();
    println!("Signature form:");
    println!("  XAdES-X-L (signature and SigAndRefs time-stamps, complete references, embedded values)");
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<DssConfig, Error> {
    match path {
        Some(p) => DssConfig::load(p),
        None => Ok(DssConfig::default()),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data).map_err(|e| Error::Other(format!("{}: {e}", p.display()))),
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(data)
                .map_err(|e| Error::Other(format!("stdout: {e}")))
        }
    }
}
