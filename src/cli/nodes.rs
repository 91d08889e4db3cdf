use anyhow::{Context, Result};

use super::args::{GetNodesArgs, NodeGroupsArgs};
use super::emit_table;
use crate::api::models::{Node, NodeGroup};
use crate::context::AppContext;
use crate::report::Table;
use crate::report::format::format_datetime;

pub async fn run_groups(ctx: &mut AppContext, args: &NodeGroupsArgs) -> Result<()> {
    println!("Querying node groups...");
    let groups = ctx
        .conn
        .node_groups()
        .await
        .context("Failed to get node groups")?;

    println!("Found {} node groups:", groups.len());
    emit_table(&node_groups_table(&groups)?, &args.output).await;
    Ok(())
}

pub async fn run_nodes(ctx: &mut AppContext, args: &GetNodesArgs) -> Result<()> {
    println!("Querying nodes...");
    let nodes = match args.name.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(name) => select_by_name(ctx.conn.nodes(None, None).await?, name),
        None => {
            ctx.conn
                .nodes(args.node_group.as_deref(), args.node_type.as_deref())
                .await?
        }
    };

    println!("Found {} nodes:", nodes.len());
    emit_table(&nodes_table(&nodes)?, &args.output).await;
    Ok(())
}

fn select_by_name(nodes: Vec<Node>, name: &str) -> Vec<Node> {
    nodes
        .into_iter()
        .filter(|node| node.name.eq_ignore_ascii_case(name))
        .collect()
}

fn node_groups_table(groups: &[NodeGroup]) -> Result<Table> {
    let mut table = Table::with_header([
        "Group Name",
        "Comment",
        "Media Pool",
        "Cluster",
        "Creator",
        "Creation Time",
    ]);
    for g in groups {
        table.push_row([
            g.name.clone(),
            g.comment.clone(),
            g.media_pool.clone(),
            g.cluster_name.clone(),
            g.creator.clone(),
            format_datetime(g.creation_time),
        ])?;
    }
    Ok(table)
}

fn nodes_table(nodes: &[Node]) -> Result<Table> {
    let mut table = Table::with_header([
        "Node Group",
        "Node",
        "Server Name",
        "Node Type",
        "OS",
        "OS Name",
        "OS Version",
        "Creator",
        "Creation Time",
        "Comments",
    ]);
    for n in nodes {
        table.push_row([
            n.group_name.clone(),
            n.name.clone(),
            n.server_name.clone(),
            n.node_type.clone(),
            n.os_group.to_string(),
            n.os_name.clone(),
            n.os_version.clone(),
            n.creator.clone(),
            format_datetime(n.creation_time),
            n.comment.clone(),
        ])?;
    }
    Ok(table)
}
