pub fn render_schema() -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_documents.sql")),
				"tables/002_conversations.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_conversations.sql")),
				"tables/003_chat_memory.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_chat_memory.sql")),
				"tables/004_queue_messages.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_queue_messages.sql")),
				other => {
					out.push_str("-- missing include: ");
					out.push_str(other);
				},
			}

			out.push('\n');

			continue;
		}

		out.push_str(line);
		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expands_every_table() {
		let sql = render_schema();

		for table in ["documents", "conversations", "chat_memory", "queue_messages"] {
			assert!(
				sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
				"missing table {table}"
			);
		}

		assert!(!sql.contains("\\ir"));
		assert!(!sql.contains("missing include"));
	}
}
