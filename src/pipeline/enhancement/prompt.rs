use crate::report::InputReport;

/// The six top-level keys the model must return, in output order.
pub const REPORT_SECTIONS: [&str; 6] = [
    "high_level_summary",
    "project_structure",
    "detailed_component_breakdown",
    "inter_module_relationships_workflows",
    "metadata_for_ai_parsing",
    "onboarding_guidance",
];

const PREAMBLE: &str = r#"You are an AI assistant that turns raw project analysis data into a detailed, structured project report.

The report serves two readers:
1. Human developers who need to onboard quickly, understand the codebase, and start contributing.
2. AI agents that need enough structured context, metadata, and relationships to reason about and change any module autonomously."#;

const REQUIREMENTS: &str = r#"### Report requirements

Output ONLY a valid JSON object. No prose before or after it, no Markdown fences.
The object MUST contain exactly these keys:

1. "high_level_summary":
   - Overall purpose, domain, and tech stack of the project.
   - Project scale (files, classes, functions, constants).

2. "project_structure":
   - Folder/module hierarchy.
   - Responsibility or domain role of each top-level package or folder.

3. "detailed_component_breakdown":
   - Major classes, functions, and constants per package/module.
   - The role or logic each significant class or function encapsulates.
   - Class hierarchies or inheritance relationships, where present.

4. "inter_module_relationships_workflows":
   - How major components interact and depend on each other.
   - Entry points such as command-line scripts, views, or management commands.

5. "metadata_for_ai_parsing":
   - Consistent formatting with explicit labels (Class, Function, Constant).
   - Critical classes/functions with a brief description each.
   - Data flow or control flow notes relevant to each module.

6. "onboarding_guidance":
   - Concrete first steps: modules to read first, how to run commands and tests.
   - Conventions and patterns in use (mixins, model inheritance, and so on).

The JSON must be well-formed and easy to parse, suitable for machine ingestion and readable when pretty-printed.
Keep the content clear, concise, and logically organized.

### Generate the final project report now from the input above."#;

/// Build the enhancement prompt for a structural report.
///
/// Pure: the same report always yields the same prompt.
pub fn build_enhancement_prompt(report: &InputReport) -> String {
    format!(
        r#"{PREAMBLE}

---

### Input

**Heading:**

{heading}

**Project Tree:**

{tree}

**Module Details:**

{details}

---

{REQUIREMENTS}
"#,
        heading = report.heading,
        tree = report.tree,
        details = report.details,
    )
}
