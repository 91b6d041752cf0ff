//! 语音指令匹配：按配置顺序用大小写不敏感的正则匹配转写文本，第一条命中的指令生成临时任务

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::config::VoiceCommandEntry;
use crate::core::GhostError;
use crate::tasks::{TaskDescriptor, TaskOrigin};

pub struct CommandMatcher {
    commands: Vec<(Regex, VoiceCommandEntry)>,
}

impl CommandMatcher {
    pub fn new(entries: &[VoiceCommandEntry]) -> Result<Self, GhostError> {
        let commands = entries
            .iter()
            .map(|entry| {
                RegexBuilder::new(&entry.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, entry.clone()))
                    .map_err(|e| {
                        GhostError::Config(format!("invalid voice pattern '{}': {}", entry.pattern, e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { commands })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 命中则返回注入用的任务；payload 额外带上 voice_command 原文
    pub fn match_command(&self, transcript: &str) -> Option<TaskDescriptor> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return None;
        }
        let (_, entry) = self.commands.iter().find(|(re, _)| re.is_match(transcript))?;

        let mut payload = entry.payload.clone();
        payload.insert("voice_command".to_string(), Value::String(transcript.to_string()));
        let origin = TaskOrigin::Voice {
            id: uuid::Uuid::new_v4().to_string(),
            transcript: transcript.to_string(),
        };
        Some(TaskDescriptor::new(&entry.task_type, payload, origin).with_values_suggestion(entry.values_suggestion))
    }
}
