//! 会话状态：一次研究会话的可变记录
//!
//! 查询、轮次、思考 / 动作 / 观察历史、已收集信息、来源 URL、最终答案与时间戳。
//! 所有修改必须经由 add_* / increment_iteration / set_final_answer，每次修改刷新 updated_at；
//! 修改方法本身不校验跨字段不变量，由 ReAct 循环保证调用顺序。
//!
//! history 按轮次记录三类条目在各自列表中的下标，供 Planner 按时间顺序重建对话：
//! 动作与观察属于进行中的一轮（iteration + 1）；thought 在 increment_iteration 之后追加，
//! 属于刚结束的一轮，并插到该轮其它条目之前。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一次成功的工具调用记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool_name: String,
    pub arguments: Value,
    /// 经过后置护栏处理后的工具结果
    pub result_summary: Value,
}

/// 历史条目指向的记录（各列表中的下标）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum HistoryItem {
    Thought(usize),
    Action(usize),
    Observation(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 所属轮次（从 1 计；会话开始前追加的 thought 为 0）
    pub round: u32,
    pub item: HistoryItem,
}

/// 从成功工具结果中提取的可引用片段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfoFragment {
    pub source: Option<String>,
    pub title: Option<String>,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    query: String,
    iteration: u32,
    thoughts: Vec<String>,
    actions: Vec<ActionRecord>,
    observations: Vec<String>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    collected_info: Vec<InfoFragment>,
    sources: Vec<String>,
    final_answer: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            query: query.into(),
            iteration: 0,
            thoughts: Vec::new(),
            actions: Vec::new(),
            observations: Vec::new(),
            history: Vec::new(),
            collected_info: Vec::new(),
            sources: Vec::new(),
            final_answer: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn thoughts(&self) -> &[String] {
        &self.thoughts
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    pub fn observations(&self) -> &[String] {
        &self.observations
    }

    pub fn collected_info(&self) -> &[InfoFragment] {
        &self.collected_info
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 按时间顺序排列的 thought / action / observation 条目
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn latest_thought(&self) -> Option<&str> {
        self.thoughts.last().map(String::as_str)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 追加刚结束一轮的 thought（在 increment_iteration 之后调用）
    pub fn add_thought(&mut self, thought: impl Into<String>) {
        let round = self.iteration;
        let at = self
            .history
            .iter()
            .position(|e| e.round >= round)
            .unwrap_or(self.history.len());
        self.history.insert(
            at,
            HistoryEntry {
                round,
                item: HistoryItem::Thought(self.thoughts.len()),
            },
        );
        self.thoughts.push(thought.into());
        self.touch();
    }

    pub fn add_action(&mut self, action: ActionRecord) {
        self.push_history(HistoryItem::Action(self.actions.len()));
        self.actions.push(action);
        self.touch();
    }

    pub fn add_observation(&mut self, observation: impl Into<String>) {
        self.push_history(HistoryItem::Observation(self.observations.len()));
        self.observations.push(observation.into());
        self.touch();
    }

    fn push_history(&mut self, item: HistoryItem) {
        self.history.push(HistoryEntry {
            round: self.iteration + 1,
            item,
        });
    }

    pub fn add_info(&mut self, info: InfoFragment) {
        self.collected_info.push(info);
        self.touch();
    }

    /// 重复 URL 为 no-op（不刷新时间戳）；空串忽略
    pub fn add_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if source.is_empty() || self.sources.contains(&source) {
            return;
        }
        self.sources.push(source);
        self.touch();
    }

    pub fn increment_iteration(&mut self) {
        self.iteration += 1;
        self.touch();
    }

    pub fn set_final_answer(&mut self, answer: impl Into<String>) {
        self.final_answer = Some(answer.into());
        self.touch();
    }

    /// 序列化为普通 JSON 值（检查点与失败结果使用）
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}
