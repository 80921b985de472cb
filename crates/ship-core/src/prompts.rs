//! Prompt templates for every LLM-calling role, kept in one file so the
//! XML contract each parser expects is easy to audit against what is
//! actually asked for.

pub fn validator_prompt(design_text: &str, context: &[String], override_prompt: &str) -> String {
    let context_section = if context.is_empty() {
        String::new()
    } else {
        let joined: String = context.iter().map(|c| format!("- {c}\n")).collect();
        format!("\nAdditional context:\n{joined}")
    };
    let override_section = if override_prompt.is_empty() {
        String::new()
    } else {
        format!("\nOverride instructions: {override_prompt}\n")
    };

    format!(
        "{override_section}You are a strict design reviewer for a planner-worker-judge coding pipeline.\n\
Decide if the design is specific enough that the planner can generate concrete tasks and the workers can produce a clear, verifiable outcome.\n\n\
Design:\n{design_text}\n{context_section}\n\
Return ONLY this XML:\n\
<validation>\n\
<decision>accept|reject</decision>\n\
<gaps>\n\
<gap>Missing explicit target language/framework</gap>\n\
</gaps>\n\
<project>\n\
...PROJECT.md content if accepted...\n\
</project>\n\
</validation>\n\n\
Rules:\n\
- Reject if key details are missing (language, runtime, interface/IO, scope, constraints).\n\
- Reject if the desired end state is not clearly testable or observable.\n\
- Reject if the design would likely produce ambiguous tasks or unclear \"done\" criteria.\n\
- If accepted, output empty <gaps></gaps>.\n\
- If accepted, generate a concise PROJECT.md that clarifies the goal, stack, IO surfaces, constraints, and success criteria. Use markdown.\n\
- If rejected, output empty <project></project>.\n\
- Be concise and specific in each gap."
    )
}

pub fn planner_prompt(goal: &str, plan_path: &str, override_prompt: &str) -> String {
    let override_section = if override_prompt.is_empty() {
        String::new()
    } else {
        format!("Override instructions: {override_prompt}\n\n")
    };

    format!(
        "{override_section}Analyze this design document and extract:\n\
1. A brief project context (what's being built, language/framework, purpose)\n\
2. Executable tasks\n\n\
<design>\n{goal}\n</design>\n\n\
FIRST: Write the execution plan to {plan_path}. Workers will read this file. Format:\n\n\
```markdown\n\
# PLAN\n\n\
## goal\n\
<one sentence>\n\n\
## approach\n\
<2-3 sentences on architecture/strategy>\n\n\
## tasks\n\
- [ ] task 1 description\n\
- [ ] task 2 description\n\
```\n\n\
THEN: Return ONLY this XML:\n\n\
<project>\n\
<context>4-6 sentences: what's being built, key technologies, main modules/files, important patterns or constraints workers must know. This is the only context workers get -- make it count.</context>\n\
<mode>parallel|sequential</mode>\n\
<tasks>\n\
<task worker=\"auto\">Create go.mod with module name and dependencies</task>\n\
<task worker=\"auto\">Implement HTTP server with health endpoint</task>\n\
<task worker=\"auto\" depends=\"1,2\">Write integration tests for health endpoint</task>\n\
</tasks>\n\
</project>\n\n\
Rules for mode:\n\
- parallel: workers can run tasks concurrently (default, safer choice)\n\
- sequential: tasks must run one at a time (only if tasks will conflict)\n\
- Use sequential if tasks modify the same files or have tight dependencies\n\n\
Rules for worker assignment:\n\
- worker=\"auto\": assign dynamically (default, use for most tasks)\n\
- worker=\"w0\": pin to a specific worker (use for ordered sequences)\n\n\
Rules for tasks:\n\
- CRITICAL: each task must be completable in 2 days or less -- break large features into smaller subtasks\n\
- Task description starts with a verb (Create, Add, Implement, Write)\n\
- Skip explanations, examples, documentation\n\
- Use depends=\"N\" or depends=\"N,M\" to declare dependencies on earlier tasks (1-indexed)"
    )
}

#[allow(clippy::too_many_arguments)]
pub fn worker_prompt(
    project_context: &str,
    override_prompt: &str,
    timeout_min: u64,
    description: &str,
    plan_path: &str,
    log_path: &str,
) -> String {
    let context = if project_context.is_empty() {
        String::new()
    } else {
        format!("Project: {project_context}\n\n")
    };
    let override_section = if override_prompt.is_empty() {
        String::new()
    } else {
        format!("Override instructions: {override_prompt}\n\n")
    };

    format!(
        "{override_section}{context}Before starting: read {plan_path} (execution plan) and CLAUDE.md (project patterns) if they exist -- they contain architecture and conventions that will save you from re-exploring the codebase.\n\n\
You have a {timeout_min}-minute timeout. If you time out, the task will be retried automatically. Focus on making progress.\n\n\
While working, output brief status updates using this tag:\n\
<progress>what you're doing now</progress>\n\n\
Rules:\n\
- Emit after every 2-3 tool calls\n\
- Keep under 15 words\n\
- Report concrete outcomes, not intentions\n\n\
Task: {description}\n\n\
When done, append a 1-line summary to {log_path} (create if missing). Format: `- <what you shipped>`.\n\n\
After your log entry, output this structured block. Before the status tag, output a 3-5 word outcome summary:\n\
<summary>fixed auth bug</summary>\n\
<status>done</status>\n\n\
If you could NOT fully complete the task, output:\n\
<status>partial</status>\n\
<followups>\n\
<task>description of remaining work</task>\n\
</followups>"
    )
}

pub fn judge_task_prompt(description: &str, result: &str, progress_path: &str) -> String {
    let truncated: String = result.chars().take(500).collect();
    format!(
        "A worker just completed this task:\n  {description}\n\n\
Its output (truncated):\n  {truncated}\n\n\
Read the files it claims to have created/modified. In one sentence: did it actually complete the task? If not, what's wrong?\n\n\
Append your verdict to {progress_path} under a ## log section. Format: `- HH:MM task: verdict`. Create the file/section if missing."
    )
}

pub fn refiner_prompt(project_context: &str, progress_section: &str, completed_summary: &str, failed_summary: &str) -> String {
    format!(
        "Critique this project's progress. Be strict.\n\n\
Project: {project_context}\n\n\
{progress_section}\n\n\
Completed tasks:\n{completed_summary}\n\n\
Failed tasks:\n{failed_summary}\n\n\
Questions:\n\
1. Any obvious gaps? (missing tests, broken integration, etc)\n\
2. Do failed tasks need alternative approaches?\n\
3. Anything the judge flagged as incomplete?\n\n\
If follow-up tasks are needed, output them:\n\n\
<tasks>\n\
<task>retry with different approach</task>\n\
<task>description of new follow-up work</task>\n\
</tasks>\n\n\
Or if complete:\n\
<tasks>\n\
</tasks>"
    )
}

#[allow(clippy::too_many_arguments)]
pub fn replanner_prompt(
    project_context: &str,
    goal_text: &str,
    plan_section: &str,
    progress_section: &str,
    completed_summary: &str,
    failed_summary: &str,
) -> String {
    format!(
        "Reassess this project end-to-end against the original goal.\n\n\
Project: {project_context}\n\n\
Goal:\n{goal_text}\n\n\
{plan_section}\n\n\
{progress_section}\n\n\
Completed tasks:\n{completed_summary}\n\n\
Failed tasks:\n{failed_summary}\n\n\
If the goal is not yet met, output follow-up tasks:\n\n\
<tasks>\n\
<task>description of remaining work</task>\n\
</tasks>\n\n\
Or if the goal is met:\n\
<tasks>\n\
</tasks>"
    )
}

pub fn replan_decision_prompt(old_goal: &str, new_goal: &str) -> String {
    format!(
        "The spec this run was planned from has changed on disk.\n\n\
Previous spec:\n{old_goal}\n\n\
Current spec:\n{new_goal}\n\n\
Decide whether the existing plan and task history are still valid, or whether the change is\n\
substantial enough that the run should be wiped and replanned from scratch.\n\n\
Return ONLY this XML:\n\
<decision>keep|replan</decision>\n\n\
Rules:\n\
- keep: the change is cosmetic, or adds detail without contradicting completed work.\n\
- replan: the change alters scope, architecture, or invalidates work already done."
    )
}

pub fn verifier_prompt(goal_text: &str, project_context: &str) -> String {
    let truncated: String = goal_text.chars().take(2000).collect();
    format!(
        "You are an adversarial reviewer. Prove the objective is NOT met.\n\n\
Objective:\n{truncated}\n\n\
Project: {project_context}\n\n\
Read the codebase. Generate up to 10 concrete challenges that could expose the objective as incomplete or broken.\n\n\
Rules:\n\
- Stay strictly within the stated objective\n\
- Do NOT invent requirements not in the objective\n\
- Each challenge must be a task a coding agent can execute\n\
- Be adversarial: target integration gaps, edge cases, silent failures\n\
- Phrase each as imperative: \"Verify that...\", \"Check that...\"\n\n\
Return each challenge as:\n\
<challenge>Verify that ...</challenge>"
    )
}
