//! Image kinds
//!
//! Each `base` kind knows the steps that turn a spec into a qcow2 image.
//! Planning is kept apart from execution so a build can be inspected before
//! any tool runs.

use std::path::{Path, PathBuf};

use imgrepo_spec::BaseImage;

use crate::runner::ToolCommand;

/// Where a single build reads from and writes to
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The spec file, handed to the tools as a commands file
    pub commands_file: PathBuf,
    /// Final image path inside the repository
    pub output: PathBuf,
    /// Scratch directory owned by this build
    pub work_dir: PathBuf,
}

impl BuildContext {
    /// Local copy of the base image for layered builds
    pub fn backing_file(&self) -> PathBuf {
        self.work_dir.join("base.qcow2")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Download or copy `source` to `dest`, decompressing it
    Fetch { source: String, dest: PathBuf },
    Run(ToolCommand),
}

pub trait ImageBuild: Send + Sync {
    fn kind(&self) -> &'static str;

    /// External programs the plan needs
    fn tools(&self) -> Vec<&'static str>;

    fn plan(&self, ctx: &BuildContext) -> Vec<Step>;

    /// Whether the work dir must outlive the build
    fn keeps_work_dir(&self) -> bool {
        false
    }
}

/// Strip machine specific state and give unused blocks back
fn finalize(image: &Path) -> [Step; 2] {
    [
        Step::Run(ToolCommand::virt_sysprep(image)),
        Step::Run(ToolCommand::virt_sparsify(image)),
    ]
}

const FINALIZE_TOOLS: [&str; 2] = ["virt-sysprep", "virt-sparsify"];

/// Installed from a virt-builder template
pub struct LibguestfsImage {
    pub os: String,
}

impl ImageBuild for LibguestfsImage {
    fn kind(&self) -> &'static str {
        "libguestfs"
    }

    fn tools(&self) -> Vec<&'static str> {
        let mut tools = vec!["virt-builder"];
        tools.extend(FINALIZE_TOOLS);
        tools
    }

    fn plan(&self, ctx: &BuildContext) -> Vec<Step> {
        let mut steps = vec![Step::Run(ToolCommand::virt_builder(
            &self.os,
            &ctx.commands_file,
            &ctx.output,
        ))];
        steps.extend(finalize(&ctx.output));
        steps
    }
}

/// qcow2 overlay on top of an existing image
pub struct LayeredImage {
    pub base: String,
}

impl ImageBuild for LayeredImage {
    fn kind(&self) -> &'static str {
        "layer"
    }

    fn tools(&self) -> Vec<&'static str> {
        let mut tools = vec!["qemu-img", "virt-customize"];
        tools.extend(FINALIZE_TOOLS);
        tools
    }

    fn plan(&self, ctx: &BuildContext) -> Vec<Step> {
        let backing = ctx.backing_file();
        let mut steps = vec![
            Step::Fetch {
                source: self.base.clone(),
                dest: backing.clone(),
            },
            Step::Run(ToolCommand::qemu_img_layer(&backing, &ctx.output)),
            Step::Run(ToolCommand::virt_customize(&ctx.commands_file, &ctx.output)),
        ];
        steps.extend(finalize(&ctx.output));
        steps
    }

    fn keeps_work_dir(&self) -> bool {
        true
    }
}

/// An existing image, customized in place unless only its metadata is wanted
pub struct SimpleImage {
    pub base: String,
    pub meta_data_only: bool,
}

impl ImageBuild for SimpleImage {
    fn kind(&self) -> &'static str {
        "simple"
    }

    fn tools(&self) -> Vec<&'static str> {
        if self.meta_data_only {
            return Vec::new();
        }
        let mut tools = vec!["virt-customize"];
        tools.extend(FINALIZE_TOOLS);
        tools
    }

    fn plan(&self, ctx: &BuildContext) -> Vec<Step> {
        let mut steps = vec![Step::Fetch {
            source: self.base.clone(),
            dest: ctx.output.clone(),
        }];
        if !self.meta_data_only {
            steps.push(Step::Run(ToolCommand::virt_customize(
                &ctx.commands_file,
                &ctx.output,
            )));
            steps.extend(finalize(&ctx.output));
        }
        steps
    }
}

pub fn for_base(base: BaseImage, meta_data_only: bool) -> Box<dyn ImageBuild> {
    match base {
        BaseImage::Libguestfs(os) => Box::new(LibguestfsImage { os }),
        BaseImage::Layer(base) => Box::new(LayeredImage { base }),
        BaseImage::Simple(base) => Box::new(SimpleImage {
            base,
            meta_data_only,
        }),
    }
}
