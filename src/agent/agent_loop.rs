//! The step-by-step decision loop.

use anyhow::Context;
use chrono::Utc;

use crate::config::{AgentConfig, ConfigError};
use crate::llm::{ModelClient, ModelRequest, OpenAiClient, SimulatedClient};
use crate::memory::{extract_rules, infer_tags, ReasoningBank};
use crate::tools::{ErrorKind, Observation, SystemTools, ToolInvoker};
use crate::trajectory::{write_run_record, Judgment, RunRecord, Step};

use super::parser::{parse_directive, Directive};
use super::prompt::{build_react_prompt, REACT_SYSTEM_PROMPT};

/// Rules consulted per step.
const MAX_RETRIEVED_RULES: usize = 2;

/// Sampling temperature for primary reasoning calls.
const PRIMARY_TEMPERATURE: f32 = 0.2;

/// Case-insensitive substrings that mark the model as unsure of itself.
const UNCERTAINTY_MARKERS: &[&str] = &["not sure", "uncertain"];

/// The fixed self-critique note logged when a reflection fires.
const REFLECTION_NOTE: &str =
    "I should reconsider my previous tool choices and double-check the results.";

/// Loop state. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Answered,
    NoAction,
    Exhausted,
}

/// The task solver: one model client, one tool invoker, one shared bank.
pub struct Agent {
    config: AgentConfig,
    model: Box<dyn ModelClient>,
    tools: Box<dyn ToolInvoker>,
    bank: ReasoningBank,
}

impl Agent {
    /// Build an agent from configuration. In live mode this fails fast when
    /// no API key can be resolved, before any run begins.
    pub fn new(config: AgentConfig) -> Result<Self, ConfigError> {
        let model: Box<dyn ModelClient> = if config.simulate {
            Box::new(SimulatedClient)
        } else {
            let api_key = config.resolve_api_key()?;
            Box::new(OpenAiClient::new(api_key, config.model.clone()))
        };
        let bank = ReasoningBank::open(&config.bank_path);
        Ok(Self {
            config,
            model,
            tools: Box::new(SystemTools),
            bank,
        })
    }

    /// Create an agent with injected collaborators (useful for testing).
    pub fn with_parts(
        config: AgentConfig,
        model: Box<dyn ModelClient>,
        tools: Box<dyn ToolInvoker>,
        bank: ReasoningBank,
    ) -> Self {
        Self {
            config,
            model,
            tools,
            bank,
        }
    }

    pub fn bank(&self) -> &ReasoningBank {
        &self.bank
    }

    /// Solve one task: run the loop to a terminal state, then finalize and
    /// persist the run record exactly once.
    pub fn run_single(
        &mut self,
        task_id: u64,
        question: &str,
        file_name: &str,
        run_id: u32,
    ) -> anyhow::Result<RunRecord> {
        let created_at = Utc::now().to_rfc3339();
        let file_path = self
            .config
            .base_dir
            .join(file_name)
            .to_string_lossy()
            .to_string();

        let mut trajectory: Vec<Step> = Vec::new();
        let mut reflections_used: u32 = 0;
        let mut final_answer: Option<String> = None;
        let mut step_no: u32 = 0;
        let mut state = LoopState::Running;

        for _ in 0..self.config.max_steps {
            step_no += 1;

            let tags = infer_tags(question, &file_path);
            let rules = self.bank.retrieve_rules(&tags, MAX_RETRIEVED_RULES);
            let rule_ids: Vec<u64> = rules.iter().map(|rule| rule.id).collect();
            let reflections_remaining = self.config.max_reflections - reflections_used;

            let prompt = build_react_prompt(
                question,
                &file_path,
                &trajectory,
                reflections_remaining,
                &rules,
            );
            tracing::debug!(step = step_no, rules = rules.len(), "calling model");

            let request = ModelRequest::new(REACT_SYSTEM_PROMPT, prompt, PRIMARY_TEMPERATURE);
            let output = match self.model.complete(&request) {
                Ok(output) => output,
                Err(e) => {
                    // Failures are data: log an error observation, terminate.
                    trajectory.push(Step {
                        step: step_no,
                        thought: "(model call failed)".to_string(),
                        action: None,
                        observation: Some(Observation::err(ErrorKind::Model, e.to_string())),
                        retrieved_rules: rule_ids,
                    });
                    state = LoopState::NoAction;
                    break;
                }
            };

            match parse_directive(&output) {
                Directive::FinalAnswer(answer) => {
                    final_answer = Some(answer);
                    trajectory.push(Step {
                        step: step_no,
                        thought: output,
                        action: None,
                        observation: None,
                        retrieved_rules: rule_ids,
                    });
                    state = LoopState::Answered;
                    break;
                }
                Directive::Unparseable => {
                    trajectory.push(Step {
                        step: step_no,
                        thought: output,
                        action: None,
                        observation: Some(Observation::err(ErrorKind::Parse, "no_action_parsed")),
                        retrieved_rules: rule_ids,
                    });
                    state = LoopState::NoAction;
                    break;
                }
                Directive::ToolCall(action) => {
                    let observation = self.tools.invoke(&action);
                    let reflect = reflection_due(&observation, &output)
                        && reflections_used < self.config.max_reflections;

                    trajectory.push(Step {
                        step: step_no,
                        thought: output,
                        action: Some(action),
                        observation: Some(observation),
                        retrieved_rules: rule_ids.clone(),
                    });

                    if reflect {
                        reflections_used += 1;
                        let drafts = extract_rules(
                            self.model.as_ref(),
                            self.config.simulate,
                            question,
                            &file_path,
                            &trajectory,
                            REFLECTION_NOTE,
                        );
                        for draft in drafts {
                            match self.bank.add_rule(draft) {
                                Ok(id) => tracing::debug!(rule = id, "appended rule to bank"),
                                Err(e) => tracing::warn!("Rejected extracted rule: {}", e),
                            }
                        }
                        step_no += 1;
                        trajectory.push(Step {
                            step: step_no,
                            thought: format!("Reflection: {REFLECTION_NOTE}"),
                            action: None,
                            observation: None,
                            retrieved_rules: rule_ids,
                        });
                    }
                }
            }
        }

        if state == LoopState::Running {
            state = LoopState::Exhausted;
        }
        let judgment = if final_answer.is_some() {
            Judgment::Answered
        } else {
            Judgment::Failed
        };
        tracing::info!(
            ?state,
            %judgment,
            steps = trajectory.len(),
            reflections = reflections_used,
            "run finished"
        );

        let record = RunRecord {
            task_id,
            mode: self.config.mode.clone(),
            run_id,
            question: question.to_string(),
            file_name: file_name.to_string(),
            final_answer,
            judgment,
            trajectory,
            created_at,
            finished_at: Utc::now().to_rfc3339(),
        };
        write_run_record(&self.config.runs_dir, &record)
            .with_context(|| format!("failed to write run record for task {task_id}"))?;
        Ok(record)
    }
}

/// True when the step deserves a reflection: an error-shaped observation, or
/// uncertainty markers in the raw model text.
fn reflection_due(observation: &Observation, model_output: &str) -> bool {
    if observation.is_err() {
        return true;
    }
    let lower = model_output.to_lowercase();
    UNCERTAINTY_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use crate::tools::Action;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct ScriptedModel {
        outputs: RefCell<VecDeque<String>>,
    }

    impl ScriptedModel {
        fn new(outputs: &[&str]) -> Self {
            Self {
                outputs: RefCell::new(outputs.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl ModelClient for ScriptedModel {
        fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            self.outputs
                .borrow_mut()
                .pop_front()
                .ok_or(ModelError::EmptyResponse)
        }
    }

    struct BrokenModel;

    impl ModelClient for BrokenModel {
        fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            Err(ModelError::Transport("connection refused".to_string()))
        }
    }

    struct StubTools {
        observation: Observation,
    }

    impl ToolInvoker for StubTools {
        fn invoke(&self, _action: &Action) -> Observation {
            self.observation.clone()
        }
    }

    fn test_agent(
        dir: &tempfile::TempDir,
        model: Box<dyn ModelClient>,
        observation: Observation,
    ) -> Agent {
        let mut config = AgentConfig::new("test-model", true, dir.path().join("bank.json"));
        config.runs_dir = dir.path().join("runs");
        let bank = ReasoningBank::open(&config.bank_path);
        Agent::with_parts(config, model, Box::new(StubTools { observation }), bank)
    }

    const ACTION_OUTPUT: &str = "Thought: run the script.\nAction: python_exec(\"/tasks/calc.py\")";

    #[test]
    fn answer_terminates_with_answered_judgment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = ScriptedModel::new(&["Thought: easy.\nAnswer: Wharvton"]);
        let mut agent = test_agent(&dir, Box::new(model), Observation::ok(json!({})));

        let record = agent.run_single(1, "Which city?", "sales.xlsx", 0).expect("runs");
        assert_eq!(record.judgment, Judgment::Answered);
        assert_eq!(record.final_answer.as_deref(), Some("Wharvton"));
        assert_eq!(record.trajectory.len(), 1);
        assert!(record.trajectory[0].action.is_none());
    }

    #[test]
    fn unparseable_output_terminates_without_consuming_budget() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = ScriptedModel::new(&["I cannot decide what to do."]);
        let mut agent = test_agent(&dir, Box::new(model), Observation::ok(json!({})));

        let record = agent.run_single(1, "Which city?", "sales.xlsx", 0).expect("runs");
        assert_eq!(record.judgment, Judgment::Failed);
        assert!(record.final_answer.is_none());
        assert_eq!(record.trajectory.len(), 1);
        let observation = record.trajectory[0].observation.as_ref().expect("observation");
        assert_eq!(
            *observation,
            Observation::err(ErrorKind::Parse, "no_action_parsed")
        );
    }

    #[test]
    fn run_exhausts_after_max_steps_primary_steps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outputs: Vec<&str> = std::iter::repeat(ACTION_OUTPUT).take(10).collect();
        let model = ScriptedModel::new(&outputs);
        let mut agent = test_agent(&dir, Box::new(model), Observation::ok(json!({"stdout": "1"})));
        agent.config.max_steps = 3;

        let record = agent.run_single(1, "Which city?", "sales.xlsx", 0).expect("runs");
        assert_eq!(record.judgment, Judgment::Failed);
        let primary_steps = record
            .trajectory
            .iter()
            .filter(|step| step.action.is_some())
            .count();
        assert_eq!(primary_steps, 3);
    }

    #[test]
    fn error_observation_triggers_reflection_and_grows_bank() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = ScriptedModel::new(&[ACTION_OUTPUT, "Thought: fine now.\nAnswer: 42"]);
        let mut agent = test_agent(
            &dir,
            Box::new(model),
            Observation::err(ErrorKind::Python, "Traceback: boom"),
        );

        let record = agent.run_single(1, "Which city?", "sales.xlsx", 0).expect("runs");
        assert_eq!(record.judgment, Judgment::Answered);
        // Simulated extraction appends exactly one rule per reflection.
        assert_eq!(agent.bank().len(), 1);
        let pseudo = &record.trajectory[1];
        assert!(pseudo.thought.starts_with("Reflection: "));
        assert!(pseudo.action.is_none());
        assert!(pseudo.observation.is_none());
    }

    #[test]
    fn uncertainty_marker_triggers_reflection_on_ok_observation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uncertain = "Thought: I am not sure this is right.\nAction: python_exec(\"/tasks/calc.py\")";
        let model = ScriptedModel::new(&[uncertain, "Thought: ok.\nAnswer: 42"]);
        let mut agent = test_agent(&dir, Box::new(model), Observation::ok(json!({"stdout": "1"})));

        let record = agent.run_single(1, "Which city?", "sales.xlsx", 0).expect("runs");
        assert_eq!(agent.bank().len(), 1);
        assert_eq!(record.trajectory.len(), 3);
    }

    #[test]
    fn reflections_stop_at_max_reflections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outputs: Vec<&str> = std::iter::repeat(ACTION_OUTPUT).take(4).collect();
        let model = ScriptedModel::new(&outputs);
        let mut agent = test_agent(
            &dir,
            Box::new(model),
            Observation::err(ErrorKind::Python, "boom"),
        );
        agent.config.max_steps = 4;
        agent.config.max_reflections = 1;

        let record = agent.run_single(1, "Which city?", "sales.xlsx", 0).expect("runs");
        let reflections = record
            .trajectory
            .iter()
            .filter(|step| step.thought.starts_with("Reflection: "))
            .count();
        assert_eq!(reflections, 1);
        assert_eq!(agent.bank().len(), 1);
    }

    #[test]
    fn step_numbers_strictly_increase_without_gaps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = ScriptedModel::new(&[ACTION_OUTPUT, ACTION_OUTPUT, "Thought: ok.\nAnswer: 42"]);
        let mut agent = test_agent(
            &dir,
            Box::new(model),
            Observation::err(ErrorKind::Python, "boom"),
        );

        let record = agent.run_single(1, "Which city?", "sales.xlsx", 0).expect("runs");
        let numbers: Vec<u32> = record.trajectory.iter().map(|step| step.step).collect();
        let expected: Vec<u32> = (1..=numbers.len() as u32).collect();
        assert_eq!(numbers, expected);
    }

    #[test]
    fn model_failure_is_logged_as_error_observation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut agent = test_agent(&dir, Box::new(BrokenModel), Observation::ok(json!({})));

        let record = agent.run_single(1, "Which city?", "sales.xlsx", 0).expect("runs");
        assert_eq!(record.judgment, Judgment::Failed);
        assert_eq!(record.trajectory.len(), 1);
        let observation = record.trajectory[0].observation.as_ref().expect("observation");
        assert!(observation.is_err());
    }

    #[test]
    fn retrieved_rule_ids_reference_stored_rules() {
        let dir = tempfile::tempdir().expect("tempdir");
        // First run reflects and stores a rule; second run should retrieve it.
        let model = ScriptedModel::new(&[ACTION_OUTPUT, "Thought: ok.\nAnswer: 42"]);
        let mut agent = test_agent(
            &dir,
            Box::new(model),
            Observation::err(ErrorKind::Python, "boom"),
        );
        agent.run_single(1, "Which city had sales?", "sales.xlsx", 0).expect("runs");
        assert_eq!(agent.bank().len(), 1);

        let model = ScriptedModel::new(&["Thought: ok.\nAnswer: 42"]);
        agent.model = Box::new(model);
        let record = agent
            .run_single(1, "Which city had sales?", "sales.xlsx", 1)
            .expect("runs");
        let ids = &record.trajectory[0].retrieved_rules;
        assert_eq!(ids, &vec![1]);
    }

    #[test]
    fn simulated_end_to_end_python_task_answers_in_two_steps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut agent = test_agent(
            &dir,
            Box::new(SimulatedClient),
            Observation::ok(json!({"stdout": "42"})),
        );
        let mut base_dir = dir.path().to_path_buf();
        base_dir.push("tasks");
        agent.config.base_dir = base_dir.clone();

        let record = agent
            .run_single(1, "What does the script print?", "calc.py", 0)
            .expect("runs");
        assert_eq!(record.judgment, Judgment::Answered);
        assert_eq!(record.trajectory.len(), 2);
        let expected_path = base_dir.join("calc.py").to_string_lossy().to_string();
        assert_eq!(
            record.trajectory[0].action,
            Some(Action::PythonExec(expected_path))
        );
    }

    #[test]
    fn simulated_end_to_end_xlsx_task_queries_with_the_question() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut agent = test_agent(
            &dir,
            Box::new(SimulatedClient),
            Observation::ok(json!({"rows": []})),
        );
        agent.config.base_dir = dir.path().to_path_buf();

        let question = "Which city had the greater total sales: Wharvton or Algrimand?";
        let record = agent.run_single(2, question, "sales.xlsx", 0).expect("runs");
        assert_eq!(record.judgment, Judgment::Answered);
        let expected_path = dir.path().join("sales.xlsx").to_string_lossy().to_string();
        assert_eq!(
            record.trajectory[0].action,
            Some(Action::XlsxQuery {
                path: expected_path,
                query: question.to_string(),
            })
        );
    }

    #[test]
    fn run_record_is_persisted_on_termination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = ScriptedModel::new(&["Thought: easy.\nAnswer: 42"]);
        let mut agent = test_agent(&dir, Box::new(model), Observation::ok(json!({})));

        agent.run_single(9, "Q?", "sales.xlsx", 4).expect("runs");
        let path = dir.path().join("runs").join("9").join("enhanced_4.json");
        assert!(path.exists());
    }
}
