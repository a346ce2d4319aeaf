//! Host platform interface
//!
//! The chat host owns prompt injection, macro substitution, the function-tool
//! registry and user notifications. [`LocalHost`] renders all of these for a
//! terminal session.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::models::TemplateVars;
use crate::settings::{InjectionPosition, InjectionRole};
use crate::tools::FunctionTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Services the host platform provides to an extension.
pub trait Host: Send + Sync {
    /// Set (or with empty `text`, clear) the injected prompt named `id`.
    fn set_extension_prompt(
        &self,
        id: &str,
        text: &str,
        position: InjectionPosition,
        depth: u32,
        scan: bool,
        role: InjectionRole,
    );

    /// Expand `{{macro}}` placeholders, including host macros like `{{user}}`.
    fn substitute_params(&self, template: &str, vars: &TemplateVars) -> String;

    /// Register a tool, replacing any tool with the same name.
    fn register_function_tool(&self, tool: FunctionTool);

    fn unregister_function_tool(&self, name: &str);

    fn registered_tools(&self) -> Vec<FunctionTool>;

    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Replace every `{{name}}` found in `vars`. Unknown macros are left intact.
pub fn substitute(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = after[..end].trim();
        let value = vars
            .get(name)
            .or_else(|| vars.get(&name.to_lowercase()));
        match value {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Terminal host: prompts go to a file or stdout, notices to the log and stderr.
pub struct LocalHost {
    user_name: String,
    char_name: String,
    prompt_file: Option<PathBuf>,
    tools: Mutex<BTreeMap<String, FunctionTool>>,
    last_printed: Mutex<HashMap<String, String>>,
}

impl LocalHost {
    pub fn new(user_name: &str, char_name: &str, prompt_file: Option<PathBuf>) -> Self {
        Self {
            user_name: user_name.to_string(),
            char_name: char_name.to_string(),
            prompt_file,
            tools: Mutex::new(BTreeMap::new()),
            last_printed: Mutex::new(HashMap::new()),
        }
    }

    fn write_prompt_file(&self, path: &PathBuf, text: &str) {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::warn!("Failed to create {}: {}", dir.display(), e);
                return;
            }
        }
        if let Err(e) = fs::write(path, text) {
            tracing::warn!("Failed to write prompt file {}: {}", path.display(), e);
        }
    }
}

impl Host for LocalHost {
    fn set_extension_prompt(
        &self,
        id: &str,
        text: &str,
        position: InjectionPosition,
        depth: u32,
        scan: bool,
        role: InjectionRole,
    ) {
        tracing::debug!(
            "Prompt {} set ({} chars, position={} ({}), depth={}, scan={}, role={} ({}))",
            id,
            text.len(),
            position,
            position.host_value(),
            depth,
            scan,
            role,
            role.host_value()
        );

        if let Some(path) = &self.prompt_file {
            self.write_prompt_file(path, text);
            return;
        }

        // Print only changes so polling does not repeat the same line
        if text.is_empty() {
            return;
        }
        let mut last = match self.last_printed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.get(id).map(String::as_str) != Some(text) {
            println!("{}", text);
            last.insert(id.to_string(), text.to_string());
        }
    }

    fn substitute_params(&self, template: &str, vars: &TemplateVars) -> String {
        let mut all = vars.clone();
        all.insert("user".to_string(), self.user_name.clone());
        all.insert("char".to_string(), self.char_name.clone());
        substitute(template, &all)
    }

    fn register_function_tool(&self, tool: FunctionTool) {
        if let Ok(mut tools) = self.tools.lock() {
            tracing::debug!("Registered tool {}", tool.name);
            tools.insert(tool.name.clone(), tool);
        }
    }

    fn unregister_function_tool(&self, name: &str) {
        if let Ok(mut tools) = self.tools.lock() {
            if tools.remove(name).is_some() {
                tracing::debug!("Unregistered tool {}", name);
            }
        }
    }

    fn registered_tools(&self) -> Vec<FunctionTool> {
        self.tools
            .lock()
            .map(|tools| tools.values().cloned().collect())
            .unwrap_or_default()
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => tracing::error!("{}", message),
            NoticeLevel::Warning => tracing::warn!("{}", message),
            NoticeLevel::Info | NoticeLevel::Success => tracing::info!("{}", message),
        }
        eprintln!("[{}] {}", level, message);
    }
}
