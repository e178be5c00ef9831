//! Prompt templates.

use rag_core::ScoredChunk;

/// Reply the answer prompt asks for when the context lacks the answer.
pub const NOT_FOUND_ANSWER: &str = "Baglamda cevap bulunamadi.";

/// Ask for `num_queries` rephrasings of `question`, one per line.
pub fn paraphrase_prompt(question: &str, num_queries: usize) -> String {
    format!(
        "Kullanicinin sorusunu {n} farkli sekilde ifade et.\n\
         Her soru ayni bilgiyi farkli kelimelerle, farkli acilardan veya farkli dillerde soruyor olmali.\n\
         Sorular kisa ve net olmali.\n\
         \n\
         Orijinal soru: {question}\n\
         \n\
         Sadece {n} alternatif soru uret, her satirda bir soru.\n\
         Baska aciklama, numara veya isaret yapma. Sadece sorulari yaz.\n\
         \n\
         Alternatif sorular:",
        n = num_queries,
        question = question,
    )
}

/// Join chunk contents into the context block of the answer prompt.
pub fn render_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Grounded question answering prompt.
pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are a retrieval-based question answering assistant.

Your task:
- Answer the QUESTION using ONLY the given CONTEXT.
- Do NOT use external knowledge.
- Do NOT make assumptions.
- If the answer is not clearly found in the CONTEXT, respond EXACTLY with:
  "{not_found}"

Answer rules:
- Language: TURKISH (ASCII only)
- Answer must be SHORT, CLEAR, and DIRECT.

How to think (do NOT write these steps in the answer):
1) Identify if the question has multiple parts.
2) For each part, search the CONTEXT for a direct answer.
3) Combine answers ONLY if all parts are found in the CONTEXT.
4) If any part is missing, return "{not_found}"

### EXAMPLES

Example 1:
CONTEXT:
Daily Scrum is a time-boxed event. It lasts 15 minutes and is held daily to synchronize the team.

QUESTION:
Daily Scrum ne kadar surer?

ANSWER:
15 dakika surer.

Example 2:
CONTEXT:
Sprint Planning defines what will be done in the sprint.

QUESTION:
Sprint Planning kimler tarafindan yapilir?

ANSWER:
{not_found}

### NOW ANSWER

CONTEXT:
{context}

QUESTION:
{question}

ANSWER:
"#,
        not_found = NOT_FOUND_ANSWER,
        context = context,
        question = question,
    )
}
