use byte_common::Turn;

const SHARED: &str = "When a user sends a message, the time of when the message was send is included. \
Use this to give a sense of time passing and time related responses (for example, evening, morning, afternoon, lunch etc). \
Give your reasoning with your responses. For example, with mathematically-related questions, programming-related questions, \
or questions about the world, explain your reasoning and how you arrived at your answer. \
Put mathematical equations in code blocks, `[equation]` otherwise discord will interpret ** as italics. ";

const GUILD_CONTEXT: &str =
    "You're in a Discord channel in a Discord server, and users are identified by '[username]:'.";

const DIRECT_CONTEXT: &str =
    "You're in a Discord DM context, and the user is identified by their '[username]:'.";

const IMAGES: &str =
    " When a description is provided of an image, engage in a conversation about the image as if you have seen it.";

/// Behavioural system prompt for a new conversation.
pub fn system_prompt(is_direct: bool, owner_name: &str) -> String {
    let context = if is_direct { DIRECT_CONTEXT } else { GUILD_CONTEXT };
    format!("You are developed by {owner_name}. {SHARED}{context}{IMAGES}")
}

/// Custom prompts are stored verbatim except for double quotes, which become
/// single quotes.
pub fn sanitize_custom_prompt(prompt: &str) -> String {
    prompt.trim().replace('"', "'")
}

/// First turns of a fresh conversation.
pub fn initial_conversation(
    is_direct: bool,
    owner_name: &str,
    custom_prompt: Option<&str>,
) -> Vec<Turn> {
    let prompt = match custom_prompt {
        Some(custom) => sanitize_custom_prompt(custom),
        None => system_prompt(is_direct, owner_name),
    };
    vec![Turn::system(prompt)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use byte_common::Role;

    #[test]
    fn dm_and_guild_prompts_differ() {
        let dm = system_prompt(true, "Xeniox");
        let guild = system_prompt(false, "Xeniox");
        assert!(dm.starts_with("You are developed by Xeniox."));
        assert!(dm.contains("DM context"));
        assert!(guild.contains("Discord server"));
    }

    #[test]
    fn custom_prompt_replaces_double_quotes() {
        let turns = initial_conversation(true, "x", Some(" Say \"arr\" often "));
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[0].content, "Say 'arr' often");
    }
}
