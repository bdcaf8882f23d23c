/*!

This is the long-form manual for `weighted_election` and `electbot`.

## How an election runs

1. A moderator configures the guild: the reward roles, the weight of each role, and how
   the winners are selected. Any of these commands creates the settings of the guild
   with defaults if they do not exist yet.
2. The moderator starts an election with a list of candidates and a list of markers
   (usually emojis). Each candidate is paired with one marker, in order. Repeated
   candidates are counted once. Bots cannot run.
3. The bot posts a ballot message and attaches it to the election.
4. Members react on the ballot. Adding a reaction casts a vote for the candidate of the
   marker, removing it retracts the vote. Members can also vote with a command naming
   one or more candidates. A message can only be the ballot of one election at a time.
5. The moderator finishes the election. The winners receive the reward roles and the
   election is forgotten.

## Weights

A voter brings as many votes as the heaviest weighted role they hold. Roles are never
added together: a member holding roles of weight 1 and 3 votes with 3. A member without
any weighted role has no voting power and their reactions are not counted.

The weight is taken when the vote is cast. When the reaction is removed, the same
weight is taken back (`snapshot`, the default). With `reresolve`, the roles are looked
up again at removal time, which can leave votes behind when the roles of the voter
changed in between.

## Ignored reactions

These reactions leave the tally unchanged and are not errors:

| Reason          | When                                                   |
|-----------------|--------------------------------------------------------|
| `NotABallot`    | the message is not the ballot of an open election      |
| `BotVoter`      | the reaction comes from a bot                          |
| `UnknownMarker` | the marker is not on the ballot                        |
| `UnknownCandidate` | a vote command names someone who does not run       |
| `SelfVote`      | the voter is the candidate of the marker               |
| `DuplicateCast` | the voter already has a vote for this candidate        |
| `ZeroWeight`    | the voter holds no weighted role                       |
| `NoActiveVote`  | a removal without a vote for this candidate            |

A voter may vote for several candidates of the same election. A vote command for
several candidates is stored as a whole: either all its votes are recorded or none.

## Winner selection

* `max_votes` (default): the `winnersPool` candidates with the most votes.
* `cutoff`: every candidate with at least `votesCutoff` votes.

Candidates with equal votes are ordered by their user id, smallest first. A candidate
without any vote can still win with `max_votes` if there are not enough candidates
with votes.

## The `electbot` command

`electbot` replays a scenario file and prints the outcome of the elections:

```text
electbot --config scenario.json [--reference expected.json] [--out summary.json]
         [--retract-weight snapshot|reresolve] [--verbose]
```

The scenario is a JSON file:

```json
{
  "guilds": [
    {
      "guildId": 1,
      "rewardRoles": [900],
      "roleWeights": [{ "role": 100, "weight": 1 }, { "role": 200, "weight": 3 }],
      "winnerSelectionStrategy": "max_votes",
      "winnersPool": 2
    }
  ],
  "members": [
    { "guildId": 1, "userId": 20, "roles": [100] },
    { "guildId": 1, "userId": 99, "roles": [], "bot": true }
  ],
  "elections": [
    {
      "guildId": 1,
      "candidates": [10, 11],
      "markers": ["🍎", "🍐"],
      "ballotMessage": 5000,
      "reactions": [
        { "userId": 20, "marker": "🍎", "action": "add" },
        { "userId": 20, "marker": "🍎", "action": "remove" }
      ],
      "finish": true
    }
  ],
  "retractWeight": "snapshot"
}
```

An entry with `"action": "vote"` is a vote command and lists the `candidates` instead of
a `marker`:

```json
{ "userId": 20, "action": "vote", "candidates": [10, 11] }
```

Reactions go to the ballot message of their election unless they carry a `messageId`.
They may also carry the `roles` of the voter, in which case the member list is not
consulted. Voters that are neither listed in `members` nor carry their roles make the
replay fail.

The summary lists, for each election, the number of applied reactions, the ignored ones
by reason, and the standings. Finished elections also report their winners and the
reward roles, and every role grant is listed under `rewards`. See the `testdata`
directory for a complete example.
*/
