//! Prompt templates for the patch-generation strategies.

pub const SYSTEM_PROMPT: &str = "\
You are an expert software engineer solving GitHub issues.
You will be given a problem statement and relevant code context.
Your task is to produce a minimal, correct git patch (unified diff) that fixes the issue.

RULES:
1. Produce ONLY valid unified diff patches - no explanations outside the diff block
2. Make minimal changes - fix only what's needed
3. The patch must be syntactically correct Python
4. Use exact file paths as shown in the repository
5. Always include context lines in the diff (3 lines before/after changes)";

pub const PLAN_SOLVE_SYSTEM_PROMPT: &str = "\
You are an expert software engineer. Solve GitHub issues in two phases:

PHASE 1 - PLAN: Analyze the issue and identify:
1. Root cause of the bug/feature request
2. Which files need modification
3. What changes are needed

PHASE 2 - SOLVE: Write the exact unified diff patch.

Always output your final patch in a ```diff ... ``` code block.";

/// Stricter instructions used only by the retry pass: the structural
/// requirements are restated so the model has no room for prose.
pub const RETRY_SYSTEM_PROMPT: &str = "\
You are an expert Python developer. Your ONLY task is to output a unified diff patch.

CRITICAL: You MUST output ONLY a ```diff block. No explanations. No prose. Just the diff.

Format:
```diff
--- a/path/to/file.py
+++ b/path/to/file.py
@@ -LINE,COUNT +LINE,COUNT @@
 context line
-old line to remove
+new line to add
 context line
```";

pub fn single_shot_user(repo: &str, title: &str, problem: &str, code_context: &str) -> String {
    format!(
        "Fix the following GitHub issue by providing a unified diff patch.\n\n\
         Repository: {repo}\n\
         Issue Title: {title}\n\
         Problem Statement:\n{problem}\n\n\
         Relevant Code Context:\n{code_context}\n\n\
         Instructions:\n\
         - Provide ONLY a unified diff in ```diff format\n\
         - Make minimal changes to fix the issue\n\
         - Include proper file paths (a/path/to/file b/path/to/file)\n\
         - Include 3 lines of context around changes"
    )
}

pub fn plan_user(repo: &str, problem: &str, relevant_files: &str, grep_context: &str) -> String {
    format!(
        "Fix this GitHub issue:\n\n\
         Repository: {repo}\n\
         Issue: {problem}\n\n\
         Hint - potentially relevant files:\n{relevant_files}\n\n\
         Code snippets from grep:\n{grep_context}\n\n\
         Now produce a unified diff patch to fix this issue."
    )
}

pub fn solve_user(code_context: &str) -> String {
    format!(
        "Now write the exact unified diff patch.\n\n\
         Code context:\n{code_context}\n\n\
         Output ONLY a ```diff\n...\n``` block."
    )
}

pub fn retry_user(repo: &str, problem: &str, filepath: &str, file_content: &str) -> String {
    format!(
        "Fix this GitHub issue. Output ONLY a unified diff patch in ```diff format.\n\n\
         Issue in {repo}:\n{problem}\n\n\
         Relevant file: {filepath}\n\
         ```python\n{file_content}\n```\n\n\
         Output ONLY the ```diff block now:"
    )
}

pub fn retry_minimal_user(repo: &str, problem: &str) -> String {
    format!(
        "Fix this bug in {repo}:\n{problem}\n\n\
         Provide a minimal unified diff. Output ONLY ```diff block:"
    )
}
