use colored::Colorize;

use crate::base::BaseImage;
use crate::format::RepoFormat;
use crate::spec::ImageSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub field: String,
    pub message: String,
    /// 1-based, 0 when the issue is not tied to a line
    pub line_number: usize,
    pub severity: Severity,
}

impl Issue {
    fn error(spec: &ImageSpec, field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            line_number: spec.line_of(field).unwrap_or(0),
            severity: Severity::Error,
        }
    }

    fn warn(spec: &ImageSpec, field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            ..Self::error(spec, field, message)
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Check a parsed spec for problems that would break or surprise a build
pub fn lint(spec: &ImageSpec, format: RepoFormat) -> Vec<Issue> {
    let mut issues = Vec::new();

    for missing in spec.missing_props(format) {
        issues.push(Issue::error(
            spec,
            &missing,
            format!("'{}' is required for {} repositories", missing, format),
        ));
    }

    for (key, value) in &spec.props {
        if value.is_empty() {
            issues.push(Issue::warn(spec, key, format!("'{}' has an empty value", key)));
        }
    }

    for (key, value) in spec.invalid_file_name_props() {
        issues.push(Issue::error(
            spec,
            key,
            format!("'{}' ends up in the image file name: {:?}", key, value),
        ));
    }

    let base = match spec.get("base") {
        Some(_) => spec.base(),
        None => return issues,
    };

    match base {
        Ok(BaseImage::Simple(_)) if spec.meta_data_only() => {
            if !spec.commands.is_empty() {
                issues.push(Issue::warn(
                    spec,
                    "meta_data_only",
                    "commands are ignored when meta_data_only is set",
                ));
            }
        }
        Ok(BaseImage::Libguestfs(_) | BaseImage::Layer(_)) if spec.commands.is_empty() => {
            issues.push(Issue::warn(
                spec,
                "base",
                "no customization commands, the image only repackages its base",
            ));
        }
        Ok(_) => {}
        Err(err) => {
            issues.push(Issue::error(spec, "base", err.to_string()));
        }
    }

    issues
}

/// Render the lines around `line_number`, marking the offending one
pub fn highlight_error_line(content: &str, line_number: usize, is_fatal: bool) -> Vec<String> {
    let context_range = 3;
    let total = content.lines().count();
    let start_line = line_number.saturating_sub(context_range + 1);
    let end_line = (line_number + context_range).min(total);

    content
        .lines()
        .enumerate()
        .skip(start_line)
        .take(end_line.saturating_sub(start_line))
        .map(|(index, line)| {
            let current_line_number = index + 1;
            if current_line_number == line_number {
                let msg = format!("--> {}: {}", current_line_number, line);
                if is_fatal {
                    msg.red().bold().to_string()
                } else {
                    msg.yellow().bold().to_string()
                }
            } else {
                format!("    {}: {}", current_line_number, line)
            }
        })
        .collect()
}
