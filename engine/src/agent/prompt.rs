//! Completion request assembly

use sdk::types::ChatMessage;

use super::transcript::Transcript;
use crate::memory::PartitionedMemories;

/// Memory-usage instructions appended to the persona prompt
pub const MEMORY_PROMPT: &str = "You may have access to both the user's memories and your own memories from previous interactions. All memories under 'User memories' are exclusively for the user, and all memories under 'Companion memories' are exclusively your memories. Companion memories are things you've said in previous interactions. Use them if you think they are relevant to what the user is saying. Use your own memories to maintain consistency in your personality and previous interactions.";

/// Leading system message: persona prompt then memory instructions
pub fn system_message(persona_prompt: &str) -> ChatMessage {
    let content = if persona_prompt.trim().is_empty() {
        MEMORY_PROMPT.to_string()
    } else {
        format!("{}\n\n{}", persona_prompt.trim_end(), MEMORY_PROMPT)
    };
    ChatMessage::system(content)
}

/// Trailing system message listing both partitions under separate labels
pub fn memories_message(memories: &PartitionedMemories) -> ChatMessage {
    ChatMessage::system(format!(
        "User memories from previous interactions: {}\n\nCompanion memories from previous interactions: {}",
        memories.user.join(","),
        memories.agent.join(",")
    ))
}

/// `[system] + transcript without placeholder + [memories]`
pub fn build_request(
    persona_prompt: &str,
    transcript: &Transcript,
    memories: &PartitionedMemories,
) -> Vec<ChatMessage> {
    let mut request = Vec::with_capacity(transcript.len() + 2);
    request.push(system_message(persona_prompt));
    request.extend(transcript.to_chat());
    request.push(memories_message(memories));
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transcript::Message;
    use sdk::types::Role;

    #[test]
    fn test_request_shape() {
        let mut transcript = Transcript::with_greeting("Hi.");
        transcript.push(Message::text(Role::User, "hello"));
        transcript.push_pending();

        let memories = PartitionedMemories {
            user: vec!["likes tea".to_string(), "lives in Osaka".to_string()],
            agent: vec![],
        };

        let request = build_request("You are Haruka.", &transcript, &memories);
        assert_eq!(request.len(), 4);
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.starts_with("You are Haruka."));
        assert!(request[0].content.ends_with(MEMORY_PROMPT));
        assert_eq!(request[1], ChatMessage::assistant("Hi."));
        assert_eq!(request[2], ChatMessage::user("hello"));
        assert_eq!(
            request[3].content,
            "User memories from previous interactions: likes tea,lives in Osaka\n\nCompanion memories from previous interactions: "
        );
    }

    #[test]
    fn test_empty_persona_prompt() {
        assert_eq!(system_message("  ").content, MEMORY_PROMPT);
    }
}
