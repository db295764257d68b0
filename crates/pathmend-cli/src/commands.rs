//! Subcommand implementations.

use crate::{Args, Command, ReconcileArgs};
use anyhow::{bail, Context, Result};
use pathmend_core::cdn::{CacheInvalidator, CloudFrontInvalidator, NoopInvalidator};
use pathmend_core::migrate::{Orchestrator, Promoter, RunOptions};
use pathmend_core::persist::atomic_write_json;
use pathmend_core::report::exit_code;
use pathmend_core::scanner::{duplicate_groups, non_canonical_folders, Scanner};
use pathmend_core::{
    normalize_path, CatalogClient, Category, CorrectionTable, Environment, LocalStore,
    ObjectStore, S3Store, Settings, Target,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Store, settings and corrections shared by the store-backed commands.
struct Session {
    settings: Settings,
    store: Arc<dyn ObjectStore>,
    corrections: CorrectionTable,
}

impl Session {
    fn catalogs(&self, invalidator: Arc<dyn CacheInvalidator>) -> CatalogClient {
        CatalogClient::new(self.store.clone())
            .with_prefix(self.settings.catalog_prefix.clone())
            .with_invalidator(invalidator)
    }

    async fn invalidator(&self) -> Arc<dyn CacheInvalidator> {
        match (&self.settings.distribution_id, &self.settings.local_root) {
            (Some(id), None) => Arc::new(CloudFrontInvalidator::from_env(id.clone()).await),
            _ => Arc::new(NoopInvalidator),
        }
    }
}

pub async fn dispatch(args: Args) -> Result<u8> {
    let command = match args.command {
        Command::Normalize { raw } => {
            for r in &raw {
                println!("{}\t{}", r, normalize_path(r));
            }
            return Ok(0);
        }
        other => other,
    };

    let ctx = load_session(args.settings, args.local_root, args.corrections).await?;
    match command {
        Command::Normalize { .. } => Ok(0),
        Command::Scan { album, urls } => scan(&ctx, &album, urls).await,
        Command::Reconcile(r) => reconcile(&ctx, r).await,
        Command::Promote {
            category,
            from,
            to,
            apply,
        } => promote(&ctx, category, from, to, apply).await,
    }
}

async fn load_session(
    settings_path: Option<PathBuf>,
    local_root: Option<PathBuf>,
    corrections: Option<PathBuf>,
) -> Result<Session> {
    let path = settings_path.or_else(Settings::default_path);
    let mut settings = match path {
        Some(p) if p.exists() => {
            Settings::load(&p).with_context(|| format!("loading settings from {}", p.display()))?
        }
        _ => Settings::from_env().context("no settings file; PATHMEND_BUCKET and PATHMEND_CDN_BASE must be set")?,
    };
    if local_root.is_some() {
        settings.local_root = local_root;
    }
    if corrections.is_some() {
        settings.corrections = corrections;
    }

    let store: Arc<dyn ObjectStore> = match &settings.local_root {
        Some(root) => Arc::new(LocalStore::new(root)?),
        None => Arc::new(
            S3Store::from_env(
                settings.bucket.clone(),
                settings.endpoint_url.as_deref(),
                settings.force_path_style,
            )
            .await,
        ),
    };
    info!("Object store: {}", store.describe());

    let corrections = match &settings.corrections {
        Some(p) => CorrectionTable::load(p)?,
        None => CorrectionTable::new(),
    };

    Ok(Session {
        settings,
        store,
        corrections,
    })
}

async fn scan(ctx: &Session, album: &str, urls: bool) -> Result<u8> {
    let listing = Scanner::new(ctx.store.clone()).listing(album).await?;

    println!(
        "{}: {} folders, {} objects",
        listing.album(),
        listing.folder_count(),
        listing.object_count()
    );
    for folder in listing.folders() {
        let count = listing.files(folder).count();
        if urls {
            let url = ctx.settings.object_url(&format!("{}/{}/", listing.album(), folder));
            println!("  {:>5}  {}  {}", count, folder, url);
        } else {
            println!("  {:>5}  {}", count, folder);
        }
    }
    for key in listing.loose_keys() {
        println!("  loose  {}", key);
    }

    let non_canonical = non_canonical_folders(&listing);
    if !non_canonical.is_empty() {
        println!("\nNon-canonical folders ({}):", non_canonical.len());
        for folder in &non_canonical {
            println!("  {:?} -> {:?}", folder, ctx.corrections.canonical_folder(listing.album(), folder));
        }
    }

    let groups = duplicate_groups(&listing, &ctx.corrections);
    if !groups.is_empty() {
        println!("\nDuplicate folder groups ({}):", groups.len());
        for group in &groups {
            println!("  {}: {:?}", group.canonical, group.folders);
        }
    }
    Ok(if groups.is_empty() { 0 } else { 2 })
}

async fn reconcile(ctx: &Session, args: ReconcileArgs) -> Result<u8> {
    let targets = if args.all {
        Target::all()
    } else {
        let (Some(category), Some(env)) = (args.category, args.environment) else {
            bail!("--category and --env are required unless --all is given");
        };
        let mut target = Target::for_category(category, env);
        if let Some(album) = args.album {
            target.album = album;
        }
        if let Some(catalog) = args.catalog {
            target.catalog = catalog;
        }
        vec![target]
    };

    let options = RunOptions {
        apply: args.apply,
        consolidate: args.consolidate,
        accept_mismatches: args.accept_mismatches,
        concurrency: ctx.settings.concurrency,
        sample_limit: ctx.settings.sample_limit,
    };
    let catalogs = ctx.catalogs(ctx.invalidator().await);
    let orchestrator = Orchestrator::new(ctx.store.clone(), catalogs, ctx.corrections.clone(), options);
    let reports = orchestrator.run_all(&targets).await;

    for report in &reports {
        println!("{}", report.summary());
    }
    if let Some(path) = &args.report_out {
        match reports.as_slice() {
            [single] => single.write_json(path)?,
            many => atomic_write_json(path, &many, false)?,
        }
        info!("Report written to {}", path.display());
    }
    Ok(exit_code(&reports) as u8)
}

async fn promote(ctx: &Session, category: Category, from: Environment, to: Environment, apply: bool) -> Result<u8> {
    if from == to {
        bail!("--from and --to must differ");
    }
    let source = Target::for_category(category, from);
    let dest = Target::for_category(category, to);
    info!(
        "Promoting {} into {}",
        ctx.settings.catalog_key(&source.catalog),
        ctx.settings.catalog_key(&dest.catalog)
    );

    let catalogs = ctx.catalogs(ctx.invalidator().await);
    let promoter = Promoter::new(ctx.store.clone(), catalogs)
        .with_apply(apply)
        .with_concurrency(ctx.settings.concurrency);
    let report = promoter.promote(&source, &dest).await?;

    println!("{}", report.summary());
    for key in &report.missing_sources {
        println!("  missing source image: {}", key);
    }
    for key in &report.unverified {
        println!("  not in destination after copy: {}", key);
    }
    let incomplete = !report.missing_sources.is_empty() || (apply && !report.committed);
    Ok(if incomplete { 2 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn mirror() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(
            root.join("data/bars-dev.json"),
            r#"[{"name":"The Shady Fox","photos":["https://cdn.example.net/bar-image-dev/The Shady Fox/1.webp"]}]"#,
        )
        .unwrap();
        std::fs::create_dir_all(root.join("bar-image-dev/the-shady-fox")).unwrap();
        std::fs::write(root.join("bar-image-dev/the-shady-fox/1.webp"), b"img").unwrap();

        let settings = serde_json::json!({
            "bucket": "",
            "cdn_base": "https://cdn.example.net",
            "local_root": root,
        });
        std::fs::write(root.join("settings.json"), settings.to_string()).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_load_session_uses_local_mirror() {
        let dir = mirror();
        let session = load_session(Some(dir.path().join("settings.json")), None, None)
            .await
            .unwrap();
        assert!(session.store.describe().contains(&dir.path().display().to_string()));
        assert!(session.corrections.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_apply_writes_report() {
        let dir = mirror();
        let settings = dir.path().join("settings.json");
        let report = dir.path().join("report.json");
        let args = crate::Args::try_parse_from([
            OsString::from("pathmend"),
            "--settings".into(),
            settings.into_os_string(),
            "reconcile".into(),
            "--category".into(),
            "bar".into(),
            "--env".into(),
            "dev".into(),
            "--apply".into(),
            "--report-out".into(),
            report.clone().into_os_string(),
        ])
        .unwrap();

        assert_eq!(dispatch(args).await.unwrap(), 0);

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&report).unwrap()).unwrap();
        assert_eq!(written["uploaded"], true);
        let catalog = std::fs::read_to_string(dir.path().join("data/bars-dev.json")).unwrap();
        assert!(catalog.contains("https://cdn.example.net/bar-image-dev/the-shady-fox/1.webp"));
    }
}
