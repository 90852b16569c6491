//! Repository build pipeline
//!
//! Specs are loaded, ordered into batches and built batch by batch. Once
//! every image is built it is optionally compressed, its sidecars are
//! written, and both repository documents are regenerated from the sidecars
//! found in the repository.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use futures::{stream, StreamExt};
use imgrepo_meta::{
    artifact::write_hash_sidecar, builder::generate_from_sidecars, checksum::sha256sum,
    RepoConfig, RepoDocuments,
};
use imgrepo_spec::{depsolver::plan_builds, resolve::load_specs, BaseImage, ImageSpec};
use tracing::{error, info, warn};

use crate::{
    cleanup::{remove_stale_files, remove_work_dir, work_root},
    compress::xz_compress,
    fetch::fetch_image,
    image::{self, BuildContext, Step},
    runner::{check_tools, ToolRunner},
    types::{BuildOptions, BuiltImage},
    Error, Result,
};

#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: Vec<BuiltImage>,
    /// Spec id and error of every failed build
    pub failed: Vec<(String, Error)>,
    /// Specs never attempted because an earlier batch failed
    pub skipped: Vec<String>,
    pub documents: Option<RepoDocuments>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

pub struct Pipeline {
    options: BuildOptions,
    runner: ToolRunner,
}

impl Pipeline {
    pub fn new(options: BuildOptions) -> Self {
        let runner = ToolRunner::new(options.timeout);
        Self { options, runner }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn repo_config(&self) -> Result<RepoConfig> {
        Ok(RepoConfig::new(
            self.options.repo_name.clone(),
            &self.options.base_url,
            self.options.repo_dir.clone(),
        )?)
    }

    /// Rebuild both documents from the sidecars already in the repository
    pub fn regenerate(&self) -> Result<RepoDocuments> {
        let config = self.repo_config()?;
        Ok(generate_from_sidecars(
            config,
            &self.options.repo_dir,
            self.options.jobs,
        )?)
    }

    /// Build every spec under `spec_paths` and publish the repository.
    ///
    /// Documents are only regenerated when every image built; otherwise the
    /// report lists what failed and the previous documents stay in place.
    pub async fn run<P: AsRef<Path>>(&self, spec_paths: &[P]) -> Result<BuildReport> {
        let config = self.repo_config()?;
        let specs = load_specs(spec_paths, self.options.repo_format)?;
        let batches = plan_builds(specs)?;
        info!(
            "Building {} image(s) in {} batch(es) into {}",
            batches.iter().map(Vec::len).sum::<usize>(),
            batches.len(),
            self.options.repo_dir.display()
        );

        self.check_tools(&batches)?;

        fs::create_dir_all(&self.options.repo_dir)?;
        let stale = remove_stale_files(&self.options.repo_dir)?;
        if stale > 0 {
            warn!("Removed {} stale file(s) from a previous run", stale);
        }

        let mut report = BuildReport::default();
        let mut parents: HashMap<String, PathBuf> = HashMap::new();

        for batch in batches {
            if !report.failed.is_empty() {
                report.skipped.extend(batch.into_iter().map(|s| s.id));
                continue;
            }

            for (id, result) in self.build_batch(batch, &parents).await {
                match result {
                    Ok(built) => {
                        parents.insert(built.spec.id.clone(), built.path.clone());
                        parents.insert(built.spec.name().to_string(), built.path.clone());
                        report.built.push(built);
                    }
                    Err(err) => {
                        error!("Failed to build {}: {}", id, err);
                        report.failed.push((id, err));
                    }
                }
            }
        }

        if !report.is_success() {
            return Ok(report);
        }

        if self.options.compress {
            for built in report.built.iter_mut() {
                info!("Compressing {}", built.path.display());
                let (path, size) = xz_compress(&built.path, &self.runner).await?;
                built.path = path;
                built.uncompressed_size = Some(size);
            }
        }

        self.write_sidecars(&report.built)?;
        report.documents = Some(generate_from_sidecars(
            config,
            &self.options.repo_dir,
            self.options.jobs,
        )?);

        Ok(report)
    }

    fn check_tools(&self, batches: &[Vec<ImageSpec>]) -> Result<()> {
        let mut tools = Vec::new();
        for spec in batches.iter().flatten() {
            tools.extend(image::for_base(spec.base()?, spec.meta_data_only()).tools());
        }
        if self.options.compress {
            tools.push("xz");
        }
        tools.sort_unstable();
        tools.dedup();
        check_tools(tools)
    }

    async fn build_batch(
        &self,
        batch: Vec<ImageSpec>,
        parents: &HashMap<String, PathBuf>,
    ) -> Vec<(String, Result<BuiltImage>)> {
        let mut results: Vec<(String, Result<BuiltImage>)> = stream::iter(batch)
            .map(|spec| async move {
                let id = spec.id.clone();
                (id, self.build_one(spec, parents).await)
            })
            .buffer_unordered(self.options.parallelism())
            .collect()
            .await;

        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    async fn build_one(
        &self,
        spec: ImageSpec,
        parents: &HashMap<String, PathBuf>,
    ) -> Result<BuiltImage> {
        let base = resolve_base(&spec, parents)?;
        let image = image::for_base(base, spec.meta_data_only());
        let ctx = BuildContext {
            commands_file: spec.path.clone(),
            output: self.options.repo_dir.join(spec.image_file_name()),
            work_dir: work_root(&self.options.repo_dir).join(&spec.id),
        };

        info!("Building {} from a {} base", spec, image.kind());
        remove_work_dir(&ctx.work_dir)?;
        fs::create_dir_all(&ctx.work_dir)?;
        if ctx.output.exists() {
            fs::remove_file(&ctx.output)?;
        }

        for step in image.plan(&ctx) {
            if let Err(err) = self.execute(&step).await {
                let _ = fs::remove_file(&ctx.output);
                return Err(err);
            }
        }

        if !ctx.output.is_file() {
            return Err(Error::MissingOutput(ctx.output));
        }
        if !image.keeps_work_dir() && !self.options.keep_work {
            remove_work_dir(&ctx.work_dir)?;
        }

        info!("Built {}", ctx.output.display());
        Ok(BuiltImage {
            spec,
            kind: image.kind(),
            path: ctx.output,
            uncompressed_size: None,
        })
    }

    async fn execute(&self, step: &Step) -> Result<()> {
        match step {
            Step::Fetch { source, dest } => {
                fetch_image(source, dest, &self.runner).await?;
            }
            Step::Run(cmd) => {
                self.runner.run(cmd).await?;
            }
        }
        Ok(())
    }

    fn write_sidecars(&self, built: &[BuiltImage]) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp();
        for image in built {
            let sidecar = image.descriptor(timestamp).write_sidecar()?;
            let sha256 = sha256sum(&image.path)?;
            write_hash_sidecar(&image.path, &sha256)?;
            info!("Wrote {}", sidecar.display());
        }
        Ok(())
    }
}

/// A layered spec sitting on another spec of this run uses that spec's
/// freshly built image as its base.
pub fn resolve_base(spec: &ImageSpec, parents: &HashMap<String, PathBuf>) -> Result<BaseImage> {
    let base = spec.base()?;
    if let BaseImage::Layer(parent) = &base {
        if let Some(path) = parents.get(parent) {
            return Ok(BaseImage::Layer(path.display().to_string()));
        }
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgrepo_meta::{INDEX_FILE, REPO_METADATA_FILE};
    use imgrepo_spec::RepoFormat;
    use tempfile::{tempdir, TempDir};

    fn write_spec(dir: &Path, id: &str, props: &[(&str, &str)]) -> PathBuf {
        let content: String = props
            .iter()
            .map(|(k, v)| format!("#{}={}\n", k, v))
            .collect();
        let path = dir.join(id);
        fs::write(&path, content).unwrap();
        path
    }

    /// A specs dir with one metadata-only image on top of a local base
    fn fixture() -> (TempDir, PathBuf, BuildOptions) {
        let dir = tempdir().unwrap();
        let base = dir.path().join("el7-cloud.qcow2");
        fs::write(&base, vec![7u8; 10_000]).unwrap();

        let specs = dir.path().join("specs");
        fs::create_dir(&specs).unwrap();
        let base_prop = format!("simple:{}", base.display());
        write_spec(
            &specs,
            "el7",
            &[
                ("name", "el7"),
                ("version", "7.2"),
                ("base", &base_prop),
                ("distro", "el7"),
                ("meta_data_only", "true"),
            ],
        );

        let mut options = BuildOptions::new(dir.path().join("repo"));
        options.repo_format = RepoFormat::Lago;
        options.base_url = "http://templates.example.com/repo/".to_string();
        options.repo_name = "example".to_string();
        (dir, specs, options)
    }

    #[tokio::test]
    async fn test_build_metadata_only_image() {
        let (_dir, specs, options) = fixture();
        let repo = options.repo_dir.clone();
        let pipeline = Pipeline::new(options);

        let report = pipeline.run(&[&specs]).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.built.len(), 1);
        assert_eq!(report.built[0].kind, "simple");

        for name in [
            "el7-7.2.qcow2",
            "el7-7.2.metadata",
            "el7-7.2.hash",
            REPO_METADATA_FILE,
            INDEX_FILE,
        ] {
            assert!(repo.join(name).is_file(), "missing {}", name);
        }
        assert!(!work_root(&repo).join("el7").exists());

        let documents = report.documents.unwrap();
        let entries = documents.metadata.entries();
        assert_eq!(entries.len(), 1);
        let (name, version, entry) = entries[0];
        assert_eq!((name, version), ("el7", "7.2"));
        assert_eq!(entry.url, "http://templates.example.com/repo/el7-7.2.qcow2");
        assert_eq!(entry.size, 10_000);

        let hash = fs::read_to_string(repo.join("el7-7.2.hash")).unwrap();
        assert_eq!(hash, sha256sum(repo.join("el7-7.2.qcow2")).unwrap());
    }

    #[tokio::test]
    async fn test_regenerate_from_sidecars() {
        let (_dir, specs, options) = fixture();
        let repo = options.repo_dir.clone();
        let pipeline = Pipeline::new(options);
        pipeline.run(&[&specs]).await.unwrap();

        let before = fs::read_to_string(repo.join(INDEX_FILE)).unwrap();
        fs::remove_file(repo.join(INDEX_FILE)).unwrap();
        fs::remove_file(repo.join(REPO_METADATA_FILE)).unwrap();

        let documents = pipeline.regenerate().unwrap();
        assert_eq!(documents.index.names(), vec!["el7"]);
        assert_eq!(fs::read_to_string(repo.join(INDEX_FILE)).unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_documents_untouched() {
        let (dir, specs, options) = fixture();
        let repo = options.repo_dir.clone();
        let missing = format!("simple:{}", dir.path().join("missing.qcow2").display());
        write_spec(
            &specs,
            "broken",
            &[
                ("name", "broken"),
                ("base", &missing),
                ("distro", "el7"),
                ("meta_data_only", "true"),
            ],
        );

        let pipeline = Pipeline::new(options);
        let report = pipeline.run(&[&specs]).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert!(report.documents.is_none());
        assert!(!repo.join(REPO_METADATA_FILE).exists());
        assert!(!repo.join("broken-1.0.qcow2").exists());
    }

    #[tokio::test]
    async fn test_invalid_base_url_fails_before_building() {
        let (_dir, specs, mut options) = fixture();
        options.base_url = "ftp://example.com".to_string();
        let repo = options.repo_dir.clone();

        let result = Pipeline::new(options).run(&[&specs]).await;
        assert!(matches!(result, Err(Error::Meta(_))));
        assert!(!repo.exists());
    }

    #[tokio::test]
    async fn test_two_specs_for_one_image_fail_before_building() {
        let (dir, specs, options) = fixture();
        let other = dir.path().join("el7-other.qcow2");
        fs::write(&other, vec![8u8; 100]).unwrap();
        let other_prop = format!("simple:{}", other.display());
        write_spec(
            &specs,
            "el7-copy",
            &[
                ("name", "el7"),
                ("version", "7.2"),
                ("base", &other_prop),
                ("distro", "el7"),
                ("meta_data_only", "true"),
            ],
        );
        let repo = options.repo_dir.clone();

        let result = Pipeline::new(options).run(&[&specs]).await;
        assert!(matches!(
            result,
            Err(Error::Spec(imgrepo_spec::Error::DuplicateImage { file, .. })) if file == "el7-7.2.qcow2"
        ));
        assert!(!repo.exists());
    }

    #[tokio::test]
    async fn test_name_outside_repo_rejected() {
        let (dir, specs, options) = fixture();
        let base = format!("simple:{}", dir.path().join("el7-cloud.qcow2").display());
        write_spec(
            &specs,
            "escape",
            &[
                ("name", "../escape"),
                ("base", &base),
                ("distro", "el7"),
                ("meta_data_only", "true"),
            ],
        );

        let result = Pipeline::new(options).run(&[&specs]).await;
        assert!(matches!(
            result,
            Err(Error::Spec(imgrepo_spec::Error::InvalidProp { .. }))
        ));
        assert!(!dir.path().join("escape-1.0.qcow2").exists());
    }

    #[test]
    fn test_resolve_base_prefers_built_parent() {
        let spec = ImageSpec::parse("/specs/app", "#name=app\n#base=layer:el7\n");
        let mut parents = HashMap::new();
        assert_eq!(
            resolve_base(&spec, &parents).unwrap(),
            BaseImage::Layer("el7".to_string())
        );

        parents.insert("el7".to_string(), PathBuf::from("/repo/el7-1.0.qcow2"));
        assert_eq!(
            resolve_base(&spec, &parents).unwrap(),
            BaseImage::Layer("/repo/el7-1.0.qcow2".to_string())
        );
    }
}
