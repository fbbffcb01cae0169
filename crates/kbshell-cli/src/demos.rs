//! Canned demonstration scripts, driven through the same pipeline as
//! interactive input.

use kbshell_core::Orchestrator;

use crate::process_line;

/// The surgeon riddle: one statement, then a follow-up question asked with
/// the LLM echo forced on for the duration of the question.
pub async fn surgeon_riddle(orchestrator: &mut Orchestrator) {
    let riddle =
        "The surgeon who is the boy's father says: 'I can't operate on him, he is my son'.";
    println!("\nProcessing riddle statement:\n {riddle}");
    process_line(orchestrator, riddle).await;

    let question = "Who is the surgeon to the son?";
    println!("\nProcessing follow-up question:\n {question}");
    let echo_before = orchestrator.session().llm_echo;
    orchestrator.session_mut().llm_echo = true;
    process_line(orchestrator, question).await;
    orchestrator.session_mut().llm_echo = echo_before;
}

/// Family relationships: assert a handful of facts and rules, then query a
/// derived relationship.
pub async fn family_relationships(orchestrator: &mut Orchestrator) {
    println!("\n=== Family Relationship Proof Example ===");

    println!("\nAdding facts:");
    let facts = [
        "A mother of someone is a parent of that person.",
        "A father of someone is a parent of that person.",
        "John is the father of Mary.",
        "Mary is the mother of Bob.",
        "A parent of a parent of someone is a grandparent of that person.",
    ];
    for fact in facts {
        println!("\nProcessing: {fact}");
        process_line(orchestrator, fact).await;
    }

    let question = "Who is John to Bob?";
    println!("\nQuerying: {question}");
    process_line(orchestrator, question).await;
}
