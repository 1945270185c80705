//! System prompt for the agent loop.
//!
//! The prompt is data: it enumerates the registered tools and the exact
//! directive syntax. Callers may pass any other text to the orchestrator.

use crate::inference::tool_call_parser::ToolKind;

/// Build the default system prompt from the tool table.
pub fn build_system_prompt() -> String {
    let mut tools = String::new();
    for kind in ToolKind::ALL {
        let mut params: Vec<String> = kind
            .required_params()
            .iter()
            .map(|k| format!("{k}=..."))
            .collect();
        params.extend(kind.optional_params().iter().map(|k| format!("[{k}=...]")));
        tools.push_str(&format!(
            "- {}|{} : {}\n",
            kind.name(),
            params.join("|"),
            kind.description()
        ));
    }

    format!(
        "You are a helpful on-device assistant with access to a private file sandbox.\n\
         \n\
         To use a tool, write a directive exactly like this:\n\
         <tool>tool_name|key=value|key=value</tool>\n\
         \n\
         Available tools:\n\
         {tools}\
         \n\
         Rules:\n\
         - Paths are relative to the sandbox (folders: memory/, tasks/, notes/, chats/).\n\
         - You may emit several directives in one reply; they run in order.\n\
         - After your directives run, results arrive as <result>...</result> blocks. \
         Read them, then continue or answer the user.\n\
         - When no tool is needed, answer in plain text without any directive.\n\
         \n\
         Example:\n\
         <tool>create_file|path=notes/groceries.md|content=- milk\n- eggs</tool>\n"
    )
}
